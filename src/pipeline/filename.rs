//! Output file naming for downloaded page images.

use url::Url;

/// Fallback extension when neither the URL nor the Content-Type names one.
const FALLBACK_EXTENSION: &str = ".bin";

/// Builds the output file name for the image at `position` (0-based) in
/// reading order: `001.png`, `002.jpg`, ...
#[must_use]
pub fn page_file_name(position: usize, url: &Url, content_type: Option<&str>) -> String {
    let extension = extension_from_url(url)
        .or_else(|| content_type.and_then(extension_from_content_type).map(str::to_string))
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_string());
    format!("{:03}{extension}", position + 1)
}

/// Returns the lowercase extension (with dot) of the last path segment.
///
/// Only short alphanumeric extensions count; `chapter.4` style names and
/// opaque tokens are ignored.
pub(crate) fn extension_from_url(url: &Url) -> Option<String> {
    let last_segment = url.path_segments()?.next_back()?;
    let dot_index = last_segment.rfind('.')?;
    let ext = &last_segment[dot_index + 1..];
    let plausible = (1..=5).contains(&ext.len())
        && ext.chars().all(|c| c.is_ascii_alphanumeric())
        && ext.chars().any(|c| c.is_ascii_alphabetic());
    plausible.then(|| format!(".{}", ext.to_ascii_lowercase()))
}

/// Guesses an image extension from a Content-Type header value.
pub(crate) fn extension_from_content_type(content_type: &str) -> Option<&'static str> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    match mime.as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(".jpg"),
        "image/png" => Some(".png"),
        "image/gif" => Some(".gif"),
        "image/webp" => Some(".webp"),
        "image/avif" => Some(".avif"),
        "image/svg+xml" => Some(".svg"),
        "image/bmp" => Some(".bmp"),
        _ => None,
    }
}

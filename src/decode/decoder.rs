//! Decode primitive: local image file to an RGBA pixel buffer.

use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageReader};
use tracing::debug;
use url::Url;

/// Display-ready pixels for one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Row-major RGBA8 pixels (`width * height * 4` bytes).
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    /// Memory cost charged to the cache for this image.
    #[must_use]
    pub fn memory_cost(&self) -> usize {
        self.pixels.len()
    }

    /// Returns the longer side.
    #[must_use]
    pub fn longest_side(&self) -> u32 {
        self.width.max(self.height)
    }
}

/// Blocking decode primitive. Called on a blocking worker thread, never on
/// the async executor.
pub trait ImageDecoder: Send + Sync + 'static {
    /// Decodes the file at `path`, downscaling so the longer side is at most
    /// `max_dimension` (0 = no bound). Returns `None` when the file is not a
    /// decodable image.
    fn decode(&self, path: &Path, max_dimension: u32) -> Option<DecodedImage>;
}

/// Default decoder backed by the `image` crate. GIFs yield their first frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct RasterDecoder;

impl ImageDecoder for RasterDecoder {
    fn decode(&self, path: &Path, max_dimension: u32) -> Option<DecodedImage> {
        let decoded = ImageReader::open(path)
            .and_then(ImageReader::with_guessed_format)
            .map_err(image::ImageError::IoError)
            .and_then(ImageReader::decode);
        let image = match decoded {
            Ok(image) => image,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "image decode failed");
                return None;
            }
        };
        Some(into_display_buffer(image, max_dimension))
    }
}

fn into_display_buffer(image: DynamicImage, max_dimension: u32) -> DecodedImage {
    let oversized = max_dimension > 0 && image.width().max(image.height()) > max_dimension;
    let image = if oversized {
        image.thumbnail(max_dimension, max_dimension)
    } else {
        image
    };
    let rgba = image.into_rgba8();
    DecodedImage {
        width: rgba.width(),
        height: rgba.height(),
        pixels: rgba.into_raw(),
    }
}

/// Maps a resource identity to a local path, if it names one.
///
/// Accepts plain filesystem paths and `file://` URLs. Other URL schemes
/// (`http`, `https`, `data`, ...) return `None`: fetching is a separate step.
#[must_use]
pub fn local_file_path(resource: &str) -> Option<PathBuf> {
    let resource = resource.trim();
    if resource.is_empty() {
        return None;
    }
    if resource.starts_with("file:") {
        return Url::parse(resource).ok()?.to_file_path().ok();
    }
    if resource.contains("://") || resource.starts_with("data:") {
        return None;
    }
    Some(PathBuf::from(resource))
}

/// Returns true when `path` is an existing, non-empty regular file.
#[must_use]
pub fn is_readable_image_file(path: &Path) -> bool {
    std::fs::metadata(path).is_ok_and(|meta| meta.is_file() && meta.len() > 0)
}

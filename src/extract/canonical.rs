//! Canonical keys for deduplicating image URLs.
//!
//! Comic sites often reference the same page image several times with
//! different resize or quality parameters (a thumbnail, a lazy-load copy, a
//! full-size link). The canonical key ignores those parameters and keeps only
//! the tail of the path, so every variant collapses to one identity.

use std::sync::LazyLock;

use url::Url;

/// Query parameters that only change rendering size or quality.
pub const RESIZE_QUERY_PARAMS: &[&str] = &[
    "resize", "w", "h", "width", "height", "fit", "crop", "quality", "q",
];

/// Dummy base so relative and protocol-relative references still parse.
static KEY_BASE: LazyLock<Option<Url>> =
    LazyLock::new(|| Url::parse("canonical-key://local/").ok());

/// Removes the resize/quality parameters from `url`, keeping the rest in order.
///
/// Drops the query entirely when nothing remains.
pub fn strip_resize_params(url: &mut Url) {
    if url.query().is_none() {
        return;
    }
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(name, _)| !is_resize_param(name))
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
}

/// Derives the deduplication key for a raw image URL string.
///
/// The key is `last_directory/filename` (or just `filename` when the file
/// sits at the root). When the URL has no usable path, the key falls back to
/// the full URL with resize parameters stripped.
///
/// # Examples
///
/// ```
/// use comicfetch_core::extract::canonical_key;
///
/// assert_eq!(
///     canonical_key("https://x.example/wp/uploads/chap4pg76.png?fit=300"),
///     canonical_key("https://x.example/wp/uploads/chap4pg76.png?quality=80"),
/// );
/// assert_eq!(
///     canonical_key("https://x.example/wp/uploads/chap4pg76.png"),
///     "uploads/chap4pg76.png"
/// );
/// ```
#[must_use]
pub fn canonical_key(raw: &str) -> String {
    let raw = raw.trim();
    let parsed = KEY_BASE
        .as_ref()
        .and_then(|base| Url::options().base_url(Some(base)).parse(raw).ok());
    let Some(mut url) = parsed else {
        return raw.to_string();
    };
    strip_resize_params(&mut url);

    if let Some(key) = path_tail(&url) {
        return key;
    }

    url.set_fragment(None);
    let sanitized = url.to_string();
    // Relative inputs with no path tail fall back to their sanitized relative form.
    sanitized
        .strip_prefix("canonical-key://local/")
        .map_or_else(|| sanitized.clone(), str::to_string)
}

fn path_tail(url: &Url) -> Option<String> {
    if url.cannot_be_a_base() {
        return None;
    }
    let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        [] => None,
        [file] => Some((*file).to_string()),
        [.., dir, file] => Some(format!("{dir}/{file}")),
    }
}

fn is_resize_param(name: &str) -> bool {
    RESIZE_QUERY_PARAMS
        .iter()
        .any(|param| param.eq_ignore_ascii_case(name))
}

//! Image URL extraction from comic pages.
//!
//! Given a parsed page, a CSS selector and an optional base URL, the resolver
//! produces the ordered, deduplicated list of absolute image URLs for that
//! page. It never fails: elements that yield nothing usable are skipped, and
//! a bad selector simply selects nothing.
//!
//! # Pipeline
//!
//! 1. Pick a raw URL per element: lazy-load/CDN attributes first (in
//!    [`LAZY_IMAGE_ATTRIBUTES`] order), then the widest `srcset` /
//!    `data-srcset` candidate, then `src`.
//! 2. Deduplicate by [`canonical_key`], keeping the first occurrence.
//! 3. Resolve to an absolute URL against the base, falling back to the
//!    element's own absolute-URL resolution.
//!
//! # Example
//!
//! ```
//! use comicfetch_core::extract::extract_image_urls;
//! use url::Url;
//!
//! let base = Url::parse("https://comic.example/chapter/4/").unwrap();
//! let html = r#"
//!     <img data-src="/uploads/chap4pg76.png?fit=300">
//!     <img src="/uploads/chap4pg76.png?quality=80">
//!     <img srcset="p77-small.png 480w, p77.png 1200w">
//! "#;
//! let urls = extract_image_urls(html, "img", Some(&base));
//! assert_eq!(urls.len(), 2);
//! assert_eq!(urls[1].as_str(), "https://comic.example/chapter/4/p77.png");
//! ```

mod canonical;
mod document;
mod srcset;

use std::collections::HashSet;

use tracing::{debug, instrument, trace};
use url::Url;

pub use canonical::{RESIZE_QUERY_PARAMS, canonical_key, strip_resize_params};
pub use document::{HtmlElement, HtmlPage, MarkupDocument, MarkupElement};
pub use srcset::{SrcsetCandidate, parse_srcset, widest_srcset_url};

/// Lazy-load and CDN attributes checked before `srcset`/`src`, highest priority first.
pub const LAZY_IMAGE_ATTRIBUTES: &[&str] = &[
    "data-orig-file",
    "data-large-file",
    "data-full-url",
    "data-original",
    "data-lazy-src",
    "data-src",
    "data-cfsrc",
];

/// `srcset`-style attributes, checked in this order after the lazy attributes.
const SRCSET_ATTRIBUTES: &[&str] = &["srcset", "data-srcset"];

/// One element's preferred raw URL, before deduplication and resolution.
#[derive(Debug, Clone)]
pub struct ImageCandidate<E> {
    /// The element the URL came from.
    pub source_element: E,
    /// Raw attribute text, trimmed.
    pub raw_url: String,
}

/// Resolves the image URLs selected by `selector` in `document`.
///
/// Output order is first-seen order of unique canonical keys; no two
/// entries share a canonical key.
#[instrument(skip(document, base), fields(base = base.map(Url::as_str)))]
pub fn resolve_image_urls<D: MarkupDocument>(
    document: &D,
    selector: &str,
    base: Option<&Url>,
) -> Vec<Url> {
    let candidates = collect_candidates(document, selector);
    let total = candidates.len();

    let mut seen = HashSet::new();
    let mut resolved = Vec::new();
    for candidate in candidates {
        let key = canonical_key(&candidate.raw_url);
        if !seen.insert(key.clone()) {
            trace!(key = %key, raw = %candidate.raw_url, "duplicate image skipped");
            continue;
        }
        match resolve_candidate(&candidate, base) {
            Some(url) => resolved.push(url),
            None => debug!(raw = %candidate.raw_url, "unresolvable image URL dropped"),
        }
    }

    debug!(candidates = total, resolved = resolved.len(), "image URLs resolved");
    resolved
}

/// Parses `html` and resolves its image URLs in one step.
///
/// `base` doubles as the document URL for element-level resolution.
#[must_use]
pub fn extract_image_urls(html: &str, selector: &str, base: Option<&Url>) -> Vec<Url> {
    let page = HtmlPage::parse(html, base);
    resolve_image_urls(&page, selector, base)
}

/// Collects one candidate per selected element that yields a non-empty raw URL.
pub fn collect_candidates<'a, D: MarkupDocument>(
    document: &'a D,
    selector: &str,
) -> Vec<ImageCandidate<D::Element<'a>>> {
    document
        .select(selector)
        .into_iter()
        .filter_map(|element| {
            let raw_url = preferred_raw_url(&element)?;
            Some(ImageCandidate {
                source_element: element,
                raw_url,
            })
        })
        .collect()
}

/// Picks the raw URL for one element using the attribute priority order.
pub fn preferred_raw_url<E: MarkupElement>(element: &E) -> Option<String> {
    if let Some(value) = LAZY_IMAGE_ATTRIBUTES
        .iter()
        .find_map(|name| non_empty_attr(element, name))
    {
        return Some(value.to_string());
    }

    let from_srcset = SRCSET_ATTRIBUTES
        .iter()
        .filter_map(|name| non_empty_attr(element, name))
        .filter_map(widest_srcset_url)
        .find(|url| !is_inline_data(url));
    if let Some(url) = from_srcset {
        return Some(url.to_string());
    }

    non_empty_attr(element, "src").map(str::to_string)
}

fn resolve_candidate<E: MarkupElement>(
    candidate: &ImageCandidate<E>,
    base: Option<&Url>,
) -> Option<Url> {
    let direct = match base {
        Some(base) => base.join(&candidate.raw_url).ok(),
        None => Url::parse(&candidate.raw_url).ok(),
    };
    direct.or_else(|| element_absolute_url(&candidate.source_element))
}

/// Asks the element itself for an absolute URL, in attribute priority order.
fn element_absolute_url<E: MarkupElement>(element: &E) -> Option<Url> {
    LAZY_IMAGE_ATTRIBUTES
        .iter()
        .chain(std::iter::once(&"src"))
        .filter_map(|name| element.absolute_url(name))
        .find(|url| url.scheme() != "data")
}

fn non_empty_attr<'e, E: MarkupElement>(element: &'e E, name: &str) -> Option<&'e str> {
    element
        .attr(name)
        .map(str::trim)
        .filter(|value| !value.is_empty() && !is_inline_data(value))
}

/// `data:` URIs are inline placeholders, never fetchable pages.
fn is_inline_data(value: &str) -> bool {
    value
        .get(..5)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("data:"))
}

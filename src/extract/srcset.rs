//! `srcset` parsing: pick the widest candidate.

/// One `url width` entry of a `srcset` attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrcsetCandidate<'a> {
    /// Raw URL text.
    pub url: &'a str,
    /// Width descriptor in pixels; 0 when absent or not a `w` descriptor.
    pub width: u32,
}

/// Parses a comma-separated `srcset` value.
///
/// Entries without a parsable `NNNw` descriptor get width 0. Empty entries
/// are skipped.
#[must_use]
pub fn parse_srcset(value: &str) -> Vec<SrcsetCandidate<'_>> {
    value
        .split(',')
        .filter_map(|entry| {
            let mut parts = entry.split_whitespace();
            let url = parts.next()?;
            let width = parts
                .next()
                .and_then(|descriptor| descriptor.strip_suffix('w'))
                .and_then(|digits| digits.parse::<u32>().ok())
                .unwrap_or(0);
            Some(SrcsetCandidate { url, width })
        })
        .collect()
}

/// Returns the URL of the widest candidate; the first one wins ties.
#[must_use]
pub fn widest_srcset_url(value: &str) -> Option<&str> {
    let mut best: Option<SrcsetCandidate<'_>> = None;
    for candidate in parse_srcset(value) {
        if best.as_ref().is_none_or(|b| candidate.width > b.width) {
            best = Some(candidate);
        }
    }
    best.map(|b| b.url)
}

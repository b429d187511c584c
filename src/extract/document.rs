//! Markup boundary: element selection and attribute access.
//!
//! The resolver only needs two capabilities from a parsed page: select
//! elements by a CSS selector, and read attributes (optionally resolved to an
//! absolute URL by the element itself). [`HtmlPage`] provides them on top of
//! `scraper`.

use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

/// A parsed document the resolver can query. Never mutated by the resolver.
pub trait MarkupDocument {
    /// Element handle borrowed from the document.
    type Element<'a>: MarkupElement
    where
        Self: 'a;

    /// Returns the elements matching `selector`, in document order.
    ///
    /// An unparseable selector selects nothing.
    fn select<'a>(&'a self, selector: &str) -> Vec<Self::Element<'a>>;
}

/// Read-only view of one element.
pub trait MarkupElement {
    /// Returns the raw value of attribute `name`, if present.
    fn attr(&self, name: &str) -> Option<&str>;

    /// Resolves attribute `name` against the element's own document base URI.
    ///
    /// Returns `None` when the attribute is missing or empty, or when the
    /// value cannot be turned into an absolute URL.
    fn absolute_url(&self, name: &str) -> Option<Url>;
}

/// HTML page parsed with `scraper`, plus the URI relative references resolve against.
pub struct HtmlPage {
    html: Html,
    base_uri: Option<Url>,
}

impl HtmlPage {
    /// Parses `source`, using `document_url` as the base URI.
    ///
    /// A `<base href>` element in the page overrides `document_url`
    /// (resolved against it when relative).
    #[must_use]
    pub fn parse(source: &str, document_url: Option<&Url>) -> Self {
        let html = Html::parse_document(source);
        let base_uri = base_element_href(&html)
            .and_then(|href| match document_url {
                Some(doc) => doc.join(&href).ok(),
                None => Url::parse(&href).ok(),
            })
            .or_else(|| document_url.cloned());
        Self { html, base_uri }
    }

    /// Returns the URI that relative references resolve against.
    #[must_use]
    pub fn base_uri(&self) -> Option<&Url> {
        self.base_uri.as_ref()
    }
}

impl std::fmt::Debug for HtmlPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HtmlPage")
            .field("base_uri", &self.base_uri.as_ref().map(Url::as_str))
            .finish_non_exhaustive()
    }
}

impl MarkupDocument for HtmlPage {
    type Element<'a> = HtmlElement<'a>;

    fn select<'a>(&'a self, selector: &str) -> Vec<HtmlElement<'a>> {
        let parsed = match Selector::parse(selector) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!(selector, error = %e, "invalid selector, selecting nothing");
                return Vec::new();
            }
        };
        self.html
            .select(&parsed)
            .map(|element| HtmlElement {
                element,
                base_uri: self.base_uri.as_ref(),
            })
            .collect()
    }
}

/// Element of an [`HtmlPage`].
#[derive(Debug, Clone, Copy)]
pub struct HtmlElement<'a> {
    element: ElementRef<'a>,
    base_uri: Option<&'a Url>,
}

impl MarkupElement for HtmlElement<'_> {
    fn attr(&self, name: &str) -> Option<&str> {
        self.element.value().attr(name)
    }

    fn absolute_url(&self, name: &str) -> Option<Url> {
        let value = self.attr(name)?.trim();
        if value.is_empty() {
            return None;
        }
        match self.base_uri {
            Some(base) => base.join(value).ok(),
            None => Url::parse(value).ok(),
        }
    }
}

fn base_element_href(html: &Html) -> Option<String> {
    let selector = Selector::parse("base[href]").ok()?;
    html.select(&selector)
        .find_map(|base| base.value().attr("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty())
        .map(str::to_string)
}

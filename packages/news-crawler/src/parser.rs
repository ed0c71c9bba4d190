//! CSS-selector based item parser for search result pages.
//!
//! Result markup changes shape often, so every lookup goes through a
//! [`SelectorChain`]: an ordered list of selectors tried in sequence until one
//! matches. Adding a new layout is a matter of prepending a selector.

use anyhow::{anyhow, Context, Result};
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::traits::{ItemParser, ParsedItem};

/// Ordered fallback selectors. The first selector with a match wins.
#[derive(Debug, Clone)]
pub struct SelectorChain {
    selectors: Vec<Selector>,
}

impl SelectorChain {
    pub fn parse(specs: &[&str]) -> Result<Self> {
        let selectors = specs
            .iter()
            .map(|spec| Selector::parse(spec).map_err(|e| anyhow!("invalid selector {spec:?}: {e}")))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { selectors })
    }

    /// All matches of the first selector that matches anything.
    pub fn select_all<'a>(&self, root: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        for selector in &self.selectors {
            let found: Vec<_> = root.select(selector).collect();
            if !found.is_empty() {
                return found;
            }
        }
        Vec::new()
    }

    /// First match of the first selector that matches anything.
    pub fn select_first<'a>(&self, root: ElementRef<'a>) -> Option<ElementRef<'a>> {
        self.selectors
            .iter()
            .find_map(|selector| root.select(selector).next())
    }
}

/// Parser for the News tab of the search results page.
pub struct SearchResultParser {
    base_url: Url,
    items: SelectorChain,
    title: SelectorChain,
    link: SelectorChain,
    source: SelectorChain,
}

impl SearchResultParser {
    pub fn new() -> Result<Self> {
        Self::with_base_url("https://www.google.com")
    }

    /// `base_url` resolves site-relative links found in result blocks.
    pub fn with_base_url(base_url: &str) -> Result<Self> {
        Ok(Self {
            base_url: Url::parse(base_url).context("Invalid parser base URL")?,
            items: SelectorChain::parse(&[
                "div.SoaBEf",
                "div.Gx5Zad",
                "div[data-sokoban-container] > div",
                "#rso div.g, #search div.g",
            ])?,
            title: SelectorChain::parse(&[
                r#"div[role="heading"], a[role="heading"]"#,
                "h3, h4",
            ])?,
            link: SelectorChain::parse(&["a[href]"])?,
            source: SelectorChain::parse(&[
                "div.MgUUmf, span.MgUUmf",
                "div[data-n-tid], div.CEMjEf span",
            ])?,
        })
    }

    fn text_of(element: ElementRef<'_>) -> Option<String> {
        let text = element
            .text()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }

    /// Unwrap redirect links and resolve site-relative ones.
    fn resolve_href(&self, href: &str) -> Result<Option<String>> {
        let href = href.trim();
        if href.is_empty() {
            return Ok(None);
        }

        if href.starts_with("/url?") {
            let wrapped = self
                .base_url
                .join(href)
                .with_context(|| format!("Malformed redirect link: {href}"))?;
            let target = wrapped
                .query_pairs()
                .find(|(key, _)| key == "q")
                .map(|(_, value)| value.into_owned())
                .ok_or_else(|| anyhow!("Redirect link without target: {href}"))?;
            return Ok(Some(target));
        }

        if href.starts_with('/') {
            let joined = self
                .base_url
                .join(href)
                .with_context(|| format!("Malformed relative link: {href}"))?;
            return Ok(Some(joined.to_string()));
        }

        Ok(Some(href.to_string()))
    }
}

impl ItemParser for SearchResultParser {
    fn find_items(&self, html: &str) -> Vec<String> {
        let document = Html::parse_document(html);
        self.items
            .select_all(document.root_element())
            .into_iter()
            .map(|element| element.html())
            .collect()
    }

    fn parse_item(&self, block: &str) -> Result<Option<ParsedItem>> {
        let fragment = Html::parse_fragment(block);
        let root = fragment.root_element();

        let Some(title) = self.title.select_first(root).and_then(Self::text_of) else {
            return Ok(None);
        };

        let Some(href) = self
            .link
            .select_first(root)
            .and_then(|link| link.value().attr("href"))
        else {
            return Ok(None);
        };

        let Some(url) = self.resolve_href(href)? else {
            return Ok(None);
        };

        let source = self.source.select_first(root).and_then(Self::text_of);

        Ok(Some(ParsedItem { title, url, source }))
    }
}

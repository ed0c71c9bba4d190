use anyhow::Result;
use async_trait::async_trait;
use url::Url;

// ============================================================================
// PAGE FETCHER: Network access
// ============================================================================

/// A fetched result page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub status: u16,
    pub body: String,
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch a single result page.
    ///
    /// `Ok(None)` means navigation produced no response at all. HTTP error
    /// statuses are returned as pages, not errors; the caller classifies them.
    async fn fetch(&self, url: &Url) -> Result<Option<FetchedPage>>;
}

// ============================================================================
// ITEM PARSER: raw page -> candidate blocks -> parsed item
// ============================================================================

/// Fields parsed out of one candidate block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedItem {
    pub title: String,
    pub url: String,
    pub source: Option<String>,
}

pub trait ItemParser: Send + Sync {
    /// Split a result page into candidate item blocks (HTML fragments).
    fn find_items(&self, html: &str) -> Vec<String>;

    /// Parse one block.
    ///
    /// `Ok(None)` means the block is not a news item (no title or link).
    /// An error is isolated to this block by the caller.
    fn parse_item(&self, block: &str) -> Result<Option<ParsedItem>>;
}

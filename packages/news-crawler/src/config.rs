use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Number of results per search result page (fixed by the search source).
pub const PAGE_SIZE: u32 = 10;

/// Default search endpoint (News tab of the search engine).
pub const DEFAULT_SEARCH_URL: &str = "https://www.google.com/search";

/// Configuration for a crawl run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    pub search_url: String,
    /// `None` runs until the natural stop condition.
    pub max_pages: Option<i64>,
    /// Pause after each page, gives dynamic content time to settle and keeps
    /// the request rate polite.
    #[serde(with = "duration_millis")]
    pub page_delay: Duration,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            search_url: DEFAULT_SEARCH_URL.to_string(),
            max_pages: None,
            page_delay: Duration::from_secs(1),
        }
    }
}

impl CrawlConfig {
    pub fn with_search_url(mut self, url: impl Into<String>) -> Self {
        self.search_url = url.into();
        self
    }

    pub fn with_max_pages(mut self, max_pages: Option<i64>) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

use anyhow::{Context, Result};
use std::sync::Arc;
use url::Url;

use crate::config::{CrawlConfig, PAGE_SIZE};
use crate::traits::{ItemParser, PageFetcher};
use crate::types::{NewsEntry, ScraperLog};

/// Entries and per-page logs of one crawl run, oldest first.
#[derive(Debug, Clone, Default)]
pub struct CrawlResult {
    pub entries: Vec<NewsEntry>,
    pub logs: Vec<ScraperLog>,
}

/// Build the search URL for one result page.
///
/// Results are sorted by date, limited to the past hour, and include the
/// same story from different sources (`tbs=sbd:1,qdr:h,nsd:1`).
pub fn search_url(base: &str, topic: &str, page_number: u32) -> Result<Url> {
    let query = topic.split_whitespace().collect::<Vec<_>>().join(" ");
    let start = page_number.saturating_sub(1) * PAGE_SIZE;

    let mut url = Url::parse(base).with_context(|| format!("Invalid search URL: {base}"))?;
    url.query_pairs_mut()
        .append_pair("tbm", "nws")
        .append_pair("tbs", "sbd:1,qdr:h,nsd:1")
        .append_pair("start", &start.to_string())
        .append_pair("q", &query);
    Ok(url)
}

/// Multi-page crawl engine for a single topic.
pub struct Crawler {
    fetcher: Arc<dyn PageFetcher>,
    parser: Arc<dyn ItemParser>,
    config: CrawlConfig,
}

impl Crawler {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        parser: Arc<dyn ItemParser>,
        config: CrawlConfig,
    ) -> Self {
        Self {
            fetcher,
            parser,
            config,
        }
    }

    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }

    /// Crawl `topic` using the configured page limit.
    pub async fn crawl(&self, topic: &str) -> CrawlResult {
        self.crawl_pages(topic, self.config.max_pages).await
    }

    /// Crawl result pages until a page yields nothing, a page fails, or
    /// `max_pages` pages have been fetched.
    ///
    /// Pages arrive newest first; the returned lists are oldest first. A limit
    /// of zero or less fetches nothing.
    pub async fn crawl_pages(&self, topic: &str, max_pages: Option<i64>) -> CrawlResult {
        tracing::info!(topic = %topic, max_pages = ?max_pages, "Starting crawl");

        let mut result = CrawlResult::default();
        let mut page_number: u32 = 1;

        loop {
            if let Some(max) = max_pages {
                if i64::from(page_number) > max {
                    break;
                }
            }

            let (entries, log) = self.crawl_page(topic, page_number).await;
            let stop = entries.is_empty() || !log.success;

            result.logs.push(log);
            if stop {
                break;
            }

            result.entries.extend(entries);
            page_number += 1;

            if !self.config.page_delay.is_zero() {
                tokio::time::sleep(self.config.page_delay).await;
            }
        }

        result.entries.reverse();
        result.logs.reverse();

        tracing::info!(
            topic = %topic,
            pages = result.logs.len(),
            entries = result.entries.len(),
            "Crawl completed"
        );
        result
    }

    async fn crawl_page(&self, topic: &str, page_number: u32) -> (Vec<NewsEntry>, ScraperLog) {
        let url = match search_url(&self.config.search_url, topic, page_number) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(topic = %topic, error = %e, "Could not build search URL");
                return (Vec::new(), ScraperLog::failed(topic, format!("{e:#}")));
            }
        };

        tracing::info!(topic = %topic, page = page_number, "Scraping news");

        let page = match self.fetcher.fetch(&url).await {
            Ok(Some(page)) => page,
            Ok(None) => {
                tracing::error!(topic = %topic, url = %url, "No response received - navigation failed");
                return (
                    Vec::new(),
                    ScraperLog::failed(topic, "No response received - Navigation failed"),
                );
            }
            Err(e) => {
                tracing::error!(topic = %topic, url = %url, error = ?e, "Error scraping news");
                return (Vec::new(), ScraperLog::failed(topic, format!("{e:#}")));
            }
        };

        if page.status >= 400 {
            tracing::error!(topic = %topic, url = %url, status = page.status, "HTTP error - request failed");
            match page.status {
                429 => tracing::error!("Rate limiting detected - too many requests"),
                403 | 503 => tracing::error!("Access blocked - scraping strategy may need adjusting"),
                _ => {}
            }
            return (Vec::new(), ScraperLog::http_error(topic, page.status));
        }

        let entries = self.parse_page(topic, &page.body);
        (entries, ScraperLog::succeeded(topic, page.status))
    }

    fn parse_page(&self, topic: &str, html: &str) -> Vec<NewsEntry> {
        let blocks = self.parser.find_items(html);
        tracing::debug!(topic = %topic, candidates = blocks.len(), "Found potential news items");

        let entries: Vec<NewsEntry> = blocks
            .iter()
            .filter_map(|block| match self.parser.parse_item(block) {
                Ok(item) => item,
                Err(e) => {
                    tracing::debug!(topic = %topic, error = %e, "Error parsing news item, skipping");
                    None
                }
            })
            .map(|item| NewsEntry::new(topic, item.title, item.url, item.source))
            .collect();

        tracing::info!(topic = %topic, parsed = entries.len(), "Parsed news entries");
        entries
    }
}

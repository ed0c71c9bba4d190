//! News crawler: paginated search-result crawling for tracked topics.
//!
//! The [`Crawler`] drives fetch/parse cycles through the [`PageFetcher`] and
//! [`ItemParser`] boundaries and returns entries plus one audit log per page.

pub mod config;
pub mod crawler;
pub mod fetcher;
pub mod parser;
pub mod traits;
pub mod types;

pub use config::*;
pub use crawler::{search_url, CrawlResult, Crawler};
pub use fetcher::HttpPageFetcher;
pub use parser::{SearchResultParser, SelectorChain};
pub use traits::{FetchedPage, ItemParser, PageFetcher, ParsedItem};
pub use types::{extract_domain, normalize_topic, NewsEntry, NewsEntryId, ScraperLog, Topic};

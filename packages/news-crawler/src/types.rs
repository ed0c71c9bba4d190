use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use url::Url;
use uuid::Uuid;

/// Unique identifier for a persisted news entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NewsEntryId(pub Uuid);

impl NewsEntryId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for NewsEntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NewsEntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for NewsEntryId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// A tracked topic. Never physically removed, only deactivated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

/// One discovered news item.
///
/// `id` and `scraped_at` are `None` until the entry has been persisted.
/// Identity for deduplication is `(topic, title, domain)`, never `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsEntry {
    pub id: Option<NewsEntryId>,
    pub topic: String,
    pub title: String,
    pub url: String,
    pub domain: String,
    pub source: Option<String>,
    pub scraped_at: Option<DateTime<Utc>>,
}

impl NewsEntry {
    /// Create an entry ready for insertion (no id, no timestamp)
    pub fn new(
        topic: impl Into<String>,
        title: impl Into<String>,
        url: impl Into<String>,
        source: Option<String>,
    ) -> Self {
        let url = url.into();
        Self {
            id: None,
            topic: topic.into(),
            title: title.into(),
            domain: extract_domain(&url),
            url,
            source,
            scraped_at: None,
        }
    }

    /// The composite key used for deduplication
    pub fn dedup_key(&self) -> (&str, &str, &str) {
        (&self.topic, &self.title, &self.domain)
    }
}

/// Audit record of a single page fetch attempt. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScraperLog {
    pub id: Option<Uuid>,
    pub topic: String,
    pub scraped_at: DateTime<Utc>,
    pub success: bool,
    pub http_status_code: Option<u16>,
    pub error_message: Option<String>,
}

impl ScraperLog {
    pub fn succeeded(topic: impl Into<String>, http_status_code: u16) -> Self {
        Self {
            id: None,
            topic: topic.into(),
            scraped_at: Utc::now(),
            success: true,
            http_status_code: Some(http_status_code),
            error_message: None,
        }
    }

    pub fn http_error(topic: impl Into<String>, http_status_code: u16) -> Self {
        Self {
            id: None,
            topic: topic.into(),
            scraped_at: Utc::now(),
            success: false,
            http_status_code: Some(http_status_code),
            error_message: None,
        }
    }

    pub fn failed(topic: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            id: None,
            topic: topic.into(),
            scraped_at: Utc::now(),
            success: false,
            http_status_code: None,
            error_message: Some(error_message.into()),
        }
    }
}

/// Host of `url` with a leading `www.` removed.
///
/// Returns an empty string when the URL cannot be parsed or has no host.
pub fn extract_domain(url: &str) -> String {
    let host = match Url::parse(url.trim()) {
        Ok(parsed) => parsed.host_str().map(str::to_string),
        Err(_) => None,
    };

    match host {
        Some(host) => host.strip_prefix("www.").unwrap_or(&host).to_string(),
        None => String::new(),
    }
}

lazy_static! {
    static ref DISALLOWED_CHARS: Regex = Regex::new(r"[^\w\s\-]").unwrap();
    static ref WHITESPACE_RUN: Regex = Regex::new(r"\s+").unwrap();
    static ref SPACED_HYPHEN: Regex = Regex::new(r"\s*-\s*").unwrap();
    static ref EDGE_HYPHENS: Regex = Regex::new(r"(^-+)|(-+$)").unwrap();
}

/// Normalize a topic name for storage and comparison.
///
/// Lowercases, drops punctuation (hyphens survive), collapses whitespace and
/// trims. Non-Latin scripts are preserved as-is.
pub fn normalize_topic(topic: &str) -> String {
    let lowered = topic.to_lowercase();
    let stripped = DISALLOWED_CHARS.replace_all(&lowered, " ");
    let collapsed = WHITESPACE_RUN.replace_all(&stripped, " ");
    let hyphenated = SPACED_HYPHEN.replace_all(&collapsed, "-");
    let trimmed = EDGE_HYPHENS.replace_all(&hyphenated, "");
    trimmed.trim().to_string()
}

// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// Naming convention: Base* for trait names (e.g., BaseNewsStore)

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

use news_crawler::{NewsEntry, NewsEntryId, ScraperLog, Topic};

// =============================================================================
// Persistence Gateway (Infrastructure)
// =============================================================================

#[async_trait]
pub trait BaseNewsStore: Send + Sync {
    /// Add a topic, or reactivate it if it was soft-deleted
    async fn add_topic(&self, name: &str) -> Result<()>;

    /// Soft-delete a topic. Unknown topics are ignored.
    async fn delete_topic(&self, name: &str) -> Result<()>;

    /// Topics ordered newest first
    async fn list_topics(&self, include_inactive: bool) -> Result<Vec<Topic>>;

    /// Insert entries, skipping any whose (topic, title, domain) already
    /// exists. Returns the number of rows written. Every written row produces
    /// one change notification.
    async fn insert_entries(&self, entries: &[NewsEntry]) -> Result<u64>;

    /// Append crawl logs
    async fn insert_logs(&self, logs: &[ScraperLog]) -> Result<u64>;

    async fn get_entry(&self, id: NewsEntryId) -> Result<Option<NewsEntry>>;

    /// Entries for a topic, newest first
    async fn list_entries(&self, topic: &str, limit: i64, offset: i64) -> Result<Vec<NewsEntry>>;

    async fn count_entries(&self, topic: &str) -> Result<i64>;

    /// Most recent crawl logs across all topics, newest first
    async fn recent_logs(&self, limit: i64) -> Result<Vec<ScraperLog>>;
}

// =============================================================================
// Change Notifications (Infrastructure)
// =============================================================================

/// Source of change notifications. Each call to `listen` opens a new,
/// exclusively owned listener.
#[async_trait]
pub trait BaseNotificationChannel: Send + Sync {
    async fn listen(&self) -> Result<Box<dyn NotificationListener>>;
}

#[async_trait]
pub trait NotificationListener: Send {
    /// Wait at most `timeout` for notifications and return every payload
    /// that is pending, in arrival order. An empty batch is not an error.
    ///
    /// Must be cancel safe: dropping the future loses no notification.
    async fn poll(&mut self, timeout: Duration) -> Result<Vec<String>>;

    /// Release the underlying connection
    async fn close(self: Box<Self>) -> Result<()>;
}

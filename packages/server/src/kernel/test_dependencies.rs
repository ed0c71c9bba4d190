// In-memory doubles for tests
//
// MemoryNewsStore is both the persistence gateway and its notification
// channel, mirroring what the Postgres trigger does on insert.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use url::Url;

use news_crawler::{FetchedPage, NewsEntry, NewsEntryId, PageFetcher, ScraperLog, Topic};

use super::{BaseNewsStore, BaseNotificationChannel, NotificationListener};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// =============================================================================
// Memory News Store
// =============================================================================

#[derive(Default)]
struct MemoryState {
    topics: Vec<Topic>,
    entries: Vec<NewsEntry>,
    logs: Vec<ScraperLog>,
}

pub struct MemoryNewsStore {
    state: Mutex<MemoryState>,
    notifications: broadcast::Sender<String>,
}

impl MemoryNewsStore {
    pub fn new() -> Self {
        let (notifications, _) = broadcast::channel(1024);
        Self {
            state: Mutex::new(MemoryState::default()),
            notifications,
        }
    }

    /// Publish a raw payload as if the database had sent it
    pub fn notify(&self, payload: &str) {
        let _ = self.notifications.send(payload.to_string());
    }

    /// Number of open listeners
    pub fn listener_count(&self) -> usize {
        self.notifications.receiver_count()
    }

    pub fn entries(&self) -> Vec<NewsEntry> {
        lock(&self.state).entries.clone()
    }

    pub fn logs(&self) -> Vec<ScraperLog> {
        lock(&self.state).logs.clone()
    }
}

impl Default for MemoryNewsStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseNewsStore for MemoryNewsStore {
    async fn add_topic(&self, name: &str) -> Result<()> {
        let mut state = lock(&self.state);
        match state.topics.iter_mut().find(|t| t.name == name) {
            Some(topic) => topic.is_active = true,
            None => state.topics.push(Topic {
                name: name.to_string(),
                created_at: Utc::now(),
                is_active: true,
            }),
        }
        Ok(())
    }

    async fn delete_topic(&self, name: &str) -> Result<()> {
        let mut state = lock(&self.state);
        if let Some(topic) = state.topics.iter_mut().find(|t| t.name == name) {
            topic.is_active = false;
        }
        Ok(())
    }

    async fn list_topics(&self, include_inactive: bool) -> Result<Vec<Topic>> {
        let state = lock(&self.state);
        let mut topics: Vec<Topic> = state
            .topics
            .iter()
            .rev()
            .filter(|t| include_inactive || t.is_active)
            .cloned()
            .collect();
        topics.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(topics)
    }

    async fn insert_entries(&self, entries: &[NewsEntry]) -> Result<u64> {
        let mut payloads = Vec::new();
        {
            let mut state = lock(&self.state);
            for entry in entries {
                let exists = state
                    .entries
                    .iter()
                    .any(|e| e.dedup_key() == entry.dedup_key());
                if exists {
                    continue;
                }

                let mut stored = entry.clone();
                let id = *stored.id.get_or_insert_with(NewsEntryId::new);
                stored.scraped_at = Some(Utc::now());
                payloads.push(format!("{}:{}", stored.topic, id));
                state.entries.push(stored);
            }
        }

        for payload in &payloads {
            self.notify(payload);
        }
        Ok(payloads.len() as u64)
    }

    async fn insert_logs(&self, logs: &[ScraperLog]) -> Result<u64> {
        let mut state = lock(&self.state);
        for log in logs {
            let mut stored = log.clone();
            stored.id.get_or_insert_with(uuid::Uuid::now_v7);
            state.logs.push(stored);
        }
        Ok(logs.len() as u64)
    }

    async fn get_entry(&self, id: NewsEntryId) -> Result<Option<NewsEntry>> {
        let state = lock(&self.state);
        Ok(state.entries.iter().find(|e| e.id == Some(id)).cloned())
    }

    async fn list_entries(&self, topic: &str, limit: i64, offset: i64) -> Result<Vec<NewsEntry>> {
        let state = lock(&self.state);
        Ok(state
            .entries
            .iter()
            .rev()
            .filter(|e| e.topic == topic)
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn count_entries(&self, topic: &str) -> Result<i64> {
        let state = lock(&self.state);
        Ok(state.entries.iter().filter(|e| e.topic == topic).count() as i64)
    }

    async fn recent_logs(&self, limit: i64) -> Result<Vec<ScraperLog>> {
        let state = lock(&self.state);
        let mut logs: Vec<ScraperLog> = state.logs.iter().rev().cloned().collect();
        logs.sort_by(|a, b| b.scraped_at.cmp(&a.scraped_at));
        logs.truncate(limit.max(0) as usize);
        Ok(logs)
    }
}

#[async_trait]
impl BaseNotificationChannel for MemoryNewsStore {
    async fn listen(&self) -> Result<Box<dyn NotificationListener>> {
        Ok(Box::new(MemoryNotificationListener {
            rx: self.notifications.subscribe(),
        }))
    }
}

pub struct MemoryNotificationListener {
    rx: broadcast::Receiver<String>,
}

#[async_trait]
impl NotificationListener for MemoryNotificationListener {
    async fn poll(&mut self, timeout: Duration) -> Result<Vec<String>> {
        let first = match tokio::time::timeout(timeout, self.rx.recv()).await {
            Err(_) => return Ok(Vec::new()),
            Ok(Ok(payload)) => payload,
            Ok(Err(broadcast::error::RecvError::Lagged(missed))) => {
                tracing::warn!(missed, "Notification listener lagged");
                return Ok(Vec::new());
            }
            Ok(Err(broadcast::error::RecvError::Closed)) => bail!("notification channel closed"),
        };

        let mut payloads = vec![first];
        loop {
            match self.rx.try_recv() {
                Ok(payload) => payloads.push(payload),
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "Notification listener lagged");
                }
                Err(_) => break,
            }
        }
        Ok(payloads)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

// =============================================================================
// Failing Notification Channel
// =============================================================================

/// Channel whose listeners fail on the first poll
#[derive(Default)]
pub struct FailingNotificationChannel {
    listens: AtomicUsize,
    closed: Arc<AtomicUsize>,
}

impl FailingNotificationChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listen_count(&self) -> usize {
        self.listens.load(Ordering::SeqCst)
    }

    pub fn closed_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BaseNotificationChannel for FailingNotificationChannel {
    async fn listen(&self) -> Result<Box<dyn NotificationListener>> {
        self.listens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FailingListener {
            closed: self.closed.clone(),
        }))
    }
}

struct FailingListener {
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl NotificationListener for FailingListener {
    async fn poll(&mut self, _timeout: Duration) -> Result<Vec<String>> {
        Err(anyhow!("connection reset by peer"))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// =============================================================================
// Mock Page Fetcher
// =============================================================================

/// Serves canned result pages keyed by `(query, start offset)`.
/// Unknown pages come back as an empty 200 page.
#[derive(Default)]
pub struct MockPageFetcher {
    pages: Mutex<HashMap<(String, u32), FetchedPage>>,
    failing_queries: Mutex<HashSet<String>>,
    calls: Mutex<Vec<Url>>,
}

impl MockPageFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, query: &str, start: u32, status: u16, body: impl Into<String>) -> Self {
        lock(&self.pages).insert(
            (query.to_string(), start),
            FetchedPage {
                status,
                body: body.into(),
            },
        );
        self
    }

    /// Every fetch for `query` fails at the transport level
    pub fn with_failure(self, query: &str) -> Self {
        lock(&self.failing_queries).insert(query.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Url> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl PageFetcher for MockPageFetcher {
    async fn fetch(&self, url: &Url) -> Result<Option<FetchedPage>> {
        lock(&self.calls).push(url.clone());

        let param = |name: &str| {
            url.query_pairs()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.into_owned())
                .unwrap_or_default()
        };
        let query = param("q");
        let start = param("start").parse().unwrap_or(0);

        if lock(&self.failing_queries).contains(&query) {
            bail!("connection timed out");
        }

        let page = lock(&self.pages)
            .get(&(query, start))
            .cloned()
            .unwrap_or(FetchedPage {
                status: 200,
                body: "<html><body></body></html>".to_string(),
            });
        Ok(Some(page))
    }
}

/// Render a result page the search parser understands.
/// Each item is `(title, url, source)`.
pub fn news_page(items: &[(&str, &str, &str)]) -> String {
    let blocks: String = items
        .iter()
        .map(|(title, url, source)| {
            format!(
                r#"<div class="SoaBEf"><a href="{url}"><div role="heading">{title}</div><div class="MgUUmf"><span>{source}</span></div></a></div>"#
            )
        })
        .collect();
    format!(r#"<html><body><div id="rso">{blocks}</div></body></html>"#)
}

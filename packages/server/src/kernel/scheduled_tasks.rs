//! Scheduled crawling using tokio-cron-scheduler.
//!
//! # Architecture
//!
//! The crawl worker owns a dedicated OS thread with its own runtime, so page
//! fetches and inter-page waits never stall the serving runtime.
//!
//! ```text
//! Scheduler (SCRAPE_SCHEDULE)
//!     │
//!     └─► run_crawl_cycle()
//!             └─► For each active topic → crawl → insert entries + insert logs
//!                     └─► AFTER INSERT trigger → change relay
//! ```

use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{anyhow, Context, Result};
use tokio::sync::oneshot;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;

use news_crawler::Crawler;

use super::BaseNewsStore;

/// Totals for one pass over the active topics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlCycleStats {
    pub topics: usize,
    pub failed_topics: usize,
    pub entries_inserted: u64,
    pub logs_inserted: u64,
}

/// Crawl every active topic once and persist the results.
///
/// Logs are written even when the entry write fails. A failing topic is
/// logged and skipped.
pub async fn run_crawl_cycle(store: &dyn BaseNewsStore, crawler: &Crawler) -> Result<CrawlCycleStats> {
    let topics = store
        .list_topics(false)
        .await
        .context("Failed to load active topics")?;

    let mut stats = CrawlCycleStats {
        topics: topics.len(),
        ..Default::default()
    };

    if topics.is_empty() {
        tracing::info!("No active topics to crawl");
        return Ok(stats);
    }

    for topic in topics {
        if let Err(e) = crawl_topic(store, crawler, &topic.name, &mut stats).await {
            stats.failed_topics += 1;
            tracing::error!(topic = %topic.name, error = %format!("{e:#}"), "Crawl failed");
        }
    }

    tracing::info!(
        topics = stats.topics,
        failed = stats.failed_topics,
        entries = stats.entries_inserted,
        "Crawl cycle complete"
    );
    Ok(stats)
}

async fn crawl_topic(
    store: &dyn BaseNewsStore,
    crawler: &Crawler,
    topic: &str,
    stats: &mut CrawlCycleStats,
) -> Result<()> {
    let result = crawler.crawl(topic).await;

    let entries = store
        .insert_entries(&result.entries)
        .await
        .context("Failed to store news entries");
    let logs = store
        .insert_logs(&result.logs)
        .await
        .context("Failed to store scraper logs");

    if let Ok(logs) = &logs {
        stats.logs_inserted += logs;
    }
    let entries = entries?;
    stats.entries_inserted += entries;
    logs?;

    tracing::info!(
        topic = %topic,
        found = result.entries.len(),
        inserted = entries,
        "Stored crawl results"
    );
    Ok(())
}

/// Start the cron scheduler with the crawl job
pub async fn start_scheduler(
    store: Arc<dyn BaseNewsStore>,
    crawler: Arc<Crawler>,
    schedule: &str,
) -> Result<JobScheduler> {
    let scheduler = JobScheduler::new().await?;

    let crawl_job = Job::new_async(schedule, move |_uuid, _lock| {
        let store = store.clone();
        let crawler = crawler.clone();
        Box::pin(async move {
            if let Err(e) = run_crawl_cycle(store.as_ref(), &crawler).await {
                tracing::error!("Crawl cycle failed: {:#}", e);
            }
        })
    })
    .with_context(|| format!("Invalid crawl schedule: {schedule}"))?;

    scheduler.add(crawl_job).await?;
    scheduler.start().await?;

    tracing::info!(schedule, "Scheduled crawling started");
    Ok(scheduler)
}

/// Handle to the crawl thread
pub struct CrawlWorker {
    shutdown: CancellationToken,
    thread: Option<JoinHandle<()>>,
}

impl CrawlWorker {
    /// Spawn the crawl thread and wait until its scheduler is running.
    pub async fn spawn(
        store: Arc<dyn BaseNewsStore>,
        crawler: Arc<Crawler>,
        schedule: String,
    ) -> Result<Self> {
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();

        let thread = std::thread::Builder::new()
            .name("crawl-worker".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(1)
                    .thread_name("crawl-runtime")
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready_tx.send(Err(anyhow!(e).context("Failed to build crawl runtime")));
                        return;
                    }
                };

                runtime.block_on(async move {
                    let mut scheduler = match start_scheduler(store, crawler, &schedule).await {
                        Ok(scheduler) => {
                            let _ = ready_tx.send(Ok(()));
                            scheduler
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };

                    token.cancelled().await;

                    if let Err(e) = scheduler.shutdown().await {
                        tracing::warn!(error = %e, "Crawl scheduler shutdown failed");
                    }
                    tracing::info!("Crawl worker stopped");
                })
            })
            .context("Failed to spawn crawl thread")?;

        ready_rx
            .await
            .map_err(|_| anyhow!("Crawl thread exited during startup"))??;

        Ok(Self {
            shutdown,
            thread: Some(thread),
        })
    }

    /// Signal the thread to stop and wait for it.
    ///
    /// A crawl cycle that is already running finishes first.
    pub async fn stop(mut self) -> Result<()> {
        self.shutdown.cancel();
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };

        tokio::task::spawn_blocking(move || thread.join())
            .await
            .context("Failed to join crawl thread")?
            .map_err(|_| anyhow!("Crawl thread panicked"))
    }
}

impl Drop for CrawlWorker {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::test_dependencies::{news_page, MemoryNewsStore, MockPageFetcher};
    use news_crawler::{CrawlConfig, NewsEntry, NewsEntryId, ScraperLog, SearchResultParser, Topic};
    use std::time::Duration;

    fn crawler(fetcher: Arc<MockPageFetcher>) -> Crawler {
        Crawler::new(
            fetcher,
            Arc::new(SearchResultParser::new().unwrap()),
            CrawlConfig::default()
                .with_max_pages(Some(2))
                .with_page_delay(Duration::ZERO),
        )
    }

    #[tokio::test]
    async fn test_cycle_crawls_active_topics_only() {
        let store = MemoryNewsStore::new();
        store.add_topic("rust").await.unwrap();
        store.add_topic("golang").await.unwrap();
        store.delete_topic("golang").await.unwrap();

        let fetcher = Arc::new(MockPageFetcher::new().with_page(
            "rust",
            0,
            200,
            news_page(&[
                ("Rust 1.90 released", "https://blog.rust-lang.org/1", "Rust Blog"),
                ("Async traits land", "https://www.lwn.net/a", "LWN"),
            ]),
        ));

        let stats = run_crawl_cycle(&store, &crawler(fetcher.clone())).await.unwrap();

        assert_eq!(stats.topics, 1);
        assert_eq!(stats.entries_inserted, 2);
        // Page 1 succeeded, page 2 was empty
        assert_eq!(stats.logs_inserted, 2);
        assert!(fetcher.calls().iter().all(|url| url.as_str().contains("q=rust")));

        let domains: Vec<String> = store.entries().into_iter().map(|e| e.domain).collect();
        assert_eq!(domains, vec!["lwn.net", "blog.rust-lang.org"]);
    }

    #[tokio::test]
    async fn test_second_cycle_inserts_nothing_new() {
        let store = MemoryNewsStore::new();
        store.add_topic("rust").await.unwrap();
        let fetcher = Arc::new(MockPageFetcher::new().with_page(
            "rust",
            0,
            200,
            news_page(&[("Same story", "https://example.com/s", "Example")]),
        ));
        let crawler = crawler(fetcher);

        let first = run_crawl_cycle(&store, &crawler).await.unwrap();
        let second = run_crawl_cycle(&store, &crawler).await.unwrap();

        assert_eq!(first.entries_inserted, 1);
        assert_eq!(second.entries_inserted, 0);
        assert_eq!(store.entries().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_recorded_as_log() {
        let store = MemoryNewsStore::new();
        store.add_topic("rust").await.unwrap();
        let fetcher = Arc::new(MockPageFetcher::new().with_failure("rust"));

        let stats = run_crawl_cycle(&store, &crawler(fetcher)).await.unwrap();

        assert_eq!(stats.failed_topics, 0);
        assert_eq!(stats.entries_inserted, 0);
        let logs = store.logs();
        assert_eq!(logs.len(), 1);
        assert!(!logs[0].success);
        assert!(logs[0]
            .error_message
            .as_deref()
            .unwrap_or_default()
            .contains("connection timed out"));
    }

    /// Store whose entry writes always fail
    struct EntryWriteFailingStore(MemoryNewsStore);

    #[async_trait::async_trait]
    impl BaseNewsStore for EntryWriteFailingStore {
        async fn add_topic(&self, name: &str) -> Result<()> {
            self.0.add_topic(name).await
        }

        async fn delete_topic(&self, name: &str) -> Result<()> {
            self.0.delete_topic(name).await
        }

        async fn list_topics(&self, include_inactive: bool) -> Result<Vec<Topic>> {
            self.0.list_topics(include_inactive).await
        }

        async fn insert_entries(&self, _entries: &[NewsEntry]) -> Result<u64> {
            Err(anyhow!("connection refused"))
        }

        async fn insert_logs(&self, logs: &[ScraperLog]) -> Result<u64> {
            self.0.insert_logs(logs).await
        }

        async fn get_entry(&self, id: NewsEntryId) -> Result<Option<NewsEntry>> {
            self.0.get_entry(id).await
        }

        async fn list_entries(&self, topic: &str, limit: i64, offset: i64) -> Result<Vec<NewsEntry>> {
            self.0.list_entries(topic, limit, offset).await
        }

        async fn count_entries(&self, topic: &str) -> Result<i64> {
            self.0.count_entries(topic).await
        }

        async fn recent_logs(&self, limit: i64) -> Result<Vec<ScraperLog>> {
            self.0.recent_logs(limit).await
        }
    }

    #[tokio::test]
    async fn test_logs_survive_failed_entry_write() {
        let store = EntryWriteFailingStore(MemoryNewsStore::new());
        store.add_topic("rust").await.unwrap();
        let fetcher = Arc::new(MockPageFetcher::new().with_page(
            "rust",
            0,
            200,
            news_page(&[("Rust 1.90 released", "https://blog.rust-lang.org/1", "Rust Blog")]),
        ));

        let stats = run_crawl_cycle(&store, &crawler(fetcher)).await.unwrap();

        assert_eq!(stats.failed_topics, 1);
        assert_eq!(stats.entries_inserted, 0);
        // Page 1 succeeded, page 2 was empty
        assert_eq!(stats.logs_inserted, 2);
        let logs = store.0.logs();
        assert_eq!(logs.len(), 2);
        assert!(logs.iter().all(|log| log.topic == "rust" && log.success));
        assert!(store.0.entries().is_empty());
    }

    #[tokio::test]
    async fn test_worker_rejects_invalid_schedule() {
        let store: Arc<dyn BaseNewsStore> = Arc::new(MemoryNewsStore::new());
        let crawler = Arc::new(crawler(Arc::new(MockPageFetcher::new())));

        let result = CrawlWorker::spawn(store, crawler, "not a cron".to_string()).await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_worker_starts_and_stops() {
        let store: Arc<dyn BaseNewsStore> = Arc::new(MemoryNewsStore::new());
        let crawler = Arc::new(crawler(Arc::new(MockPageFetcher::new())));

        let worker = CrawlWorker::spawn(store, crawler, "0 0 * * * *".to_string())
            .await
            .unwrap();

        worker.stop().await.unwrap();
    }
}

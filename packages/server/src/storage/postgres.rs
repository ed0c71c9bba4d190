use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use news_crawler::{NewsEntry, NewsEntryId, ScraperLog, Topic};

use super::retry::{with_retry, RetryPolicy};
use crate::kernel::BaseNewsStore;

/// Rows per multi-row INSERT, keeps bind parameters well under the limit
const INSERT_BATCH_SIZE: usize = 1000;

/// Persistence gateway backed by PostgreSQL.
///
/// Inserting into `news_entries` fires the `news_entries_notify` trigger,
/// which publishes one `pg_notify` per written row.
pub struct PostgresNewsStore {
    pool: PgPool,
    retry: RetryPolicy,
}

impl PostgresNewsStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn topic_from_row(r: &PgRow) -> Topic {
    Topic {
        name: r.get("name"),
        created_at: r.get("created_at"),
        is_active: r.get("is_active"),
    }
}

fn entry_from_row(r: &PgRow) -> NewsEntry {
    NewsEntry {
        id: Some(NewsEntryId(r.get("id"))),
        topic: r.get("topic"),
        title: r.get("title"),
        url: r.get("url"),
        domain: r.get("domain"),
        source: r.get("source"),
        scraped_at: Some(r.get("scraped_at")),
    }
}

fn log_from_row(r: &PgRow) -> ScraperLog {
    ScraperLog {
        id: Some(r.get("id")),
        topic: r.get("topic"),
        scraped_at: r.get("scraped_at"),
        success: r.get("success"),
        http_status_code: r
            .get::<Option<i32>, _>("http_status_code")
            .and_then(|code| u16::try_from(code).ok()),
        error_message: r.get("error_message"),
    }
}

#[async_trait]
impl BaseNewsStore for PostgresNewsStore {
    async fn add_topic(&self, name: &str) -> Result<()> {
        let pool = &self.pool;
        with_retry(self.retry, "add_topic", move || async move {
            sqlx::query(
                r#"
                INSERT INTO topics (name, is_active)
                VALUES ($1, TRUE)
                ON CONFLICT (name) DO UPDATE SET is_active = TRUE
                "#,
            )
            .bind(name)
            .execute(pool)
            .await
        })
        .await
        .context("Failed to add topic")?;
        Ok(())
    }

    async fn delete_topic(&self, name: &str) -> Result<()> {
        let pool = &self.pool;
        with_retry(self.retry, "delete_topic", move || async move {
            sqlx::query("UPDATE topics SET is_active = FALSE WHERE name = $1")
                .bind(name)
                .execute(pool)
                .await
        })
        .await
        .context("Failed to delete topic")?;
        Ok(())
    }

    async fn list_topics(&self, include_inactive: bool) -> Result<Vec<Topic>> {
        let pool = &self.pool;
        let rows = with_retry(self.retry, "list_topics", move || async move {
            sqlx::query(
                r#"
                SELECT name, created_at, is_active
                FROM topics
                WHERE is_active OR $1
                ORDER BY created_at DESC
                "#,
            )
            .bind(include_inactive)
            .fetch_all(pool)
            .await
        })
        .await
        .context("Failed to list topics")?;

        Ok(rows.iter().map(topic_from_row).collect())
    }

    async fn insert_entries(&self, entries: &[NewsEntry]) -> Result<u64> {
        let mut inserted = 0;

        for batch in entries.chunks(INSERT_BATCH_SIZE) {
            let pool = &self.pool;
            inserted += with_retry(self.retry, "insert_entries", move || async move {
                let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                    "INSERT INTO news_entries (id, topic, title, url, domain, source) ",
                );
                builder.push_values(batch, |mut row, entry| {
                    row.push_bind(entry.id.unwrap_or_default().0)
                        .push_bind(&entry.topic)
                        .push_bind(&entry.title)
                        .push_bind(&entry.url)
                        .push_bind(&entry.domain)
                        .push_bind(&entry.source);
                });
                builder.push(" ON CONFLICT (topic, title, domain) DO NOTHING");

                builder
                    .build()
                    .execute(pool)
                    .await
                    .map(|done| done.rows_affected())
            })
            .await
            .context("Failed to insert news entries")?;
        }

        Ok(inserted)
    }

    async fn insert_logs(&self, logs: &[ScraperLog]) -> Result<u64> {
        let mut inserted = 0;

        for batch in logs.chunks(INSERT_BATCH_SIZE) {
            let pool = &self.pool;
            inserted += with_retry(self.retry, "insert_logs", move || async move {
                let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                    "INSERT INTO scraper_logs (id, topic, scraped_at, success, http_status_code, error_message) ",
                );
                builder.push_values(batch, |mut row, log| {
                    row.push_bind(log.id.unwrap_or_else(Uuid::now_v7))
                        .push_bind(&log.topic)
                        .push_bind(log.scraped_at)
                        .push_bind(log.success)
                        .push_bind(log.http_status_code.map(i32::from))
                        .push_bind(&log.error_message);
                });

                builder
                    .build()
                    .execute(pool)
                    .await
                    .map(|done| done.rows_affected())
            })
            .await
            .context("Failed to insert scraper logs")?;
        }

        Ok(inserted)
    }

    async fn get_entry(&self, id: NewsEntryId) -> Result<Option<NewsEntry>> {
        let pool = &self.pool;
        let row = with_retry(self.retry, "get_entry", move || async move {
            sqlx::query(
                r#"
                SELECT id, topic, title, url, domain, source, scraped_at
                FROM news_entries
                WHERE id = $1
                "#,
            )
            .bind(id.0)
            .fetch_optional(pool)
            .await
        })
        .await
        .context("Failed to get news entry")?;

        Ok(row.as_ref().map(entry_from_row))
    }

    async fn list_entries(&self, topic: &str, limit: i64, offset: i64) -> Result<Vec<NewsEntry>> {
        let pool = &self.pool;
        let rows = with_retry(self.retry, "list_entries", move || async move {
            sqlx::query(
                r#"
                SELECT id, topic, title, url, domain, source, scraped_at
                FROM news_entries
                WHERE topic = $1
                ORDER BY scraped_at DESC, id DESC
                LIMIT $2 OFFSET $3
                "#,
            )
            .bind(topic)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
        })
        .await
        .context("Failed to list news entries")?;

        Ok(rows.iter().map(entry_from_row).collect())
    }

    async fn count_entries(&self, topic: &str) -> Result<i64> {
        let pool = &self.pool;
        let count = with_retry(self.retry, "count_entries", move || async move {
            sqlx::query_scalar::<_, i64>("SELECT COUNT(id) FROM news_entries WHERE topic = $1")
                .bind(topic)
                .fetch_one(pool)
                .await
        })
        .await
        .context("Failed to count news entries")?;

        Ok(count)
    }

    async fn recent_logs(&self, limit: i64) -> Result<Vec<ScraperLog>> {
        let pool = &self.pool;
        let rows = with_retry(self.retry, "recent_logs", move || async move {
            sqlx::query(
                r#"
                SELECT id, topic, scraped_at, success, http_status_code, error_message
                FROM scraper_logs
                ORDER BY scraped_at DESC
                LIMIT $1
                "#,
            )
            .bind(limit)
            .fetch_all(pool)
            .await
        })
        .await
        .context("Failed to get scraper logs")?;

        Ok(rows.iter().map(log_from_row).collect())
    }
}

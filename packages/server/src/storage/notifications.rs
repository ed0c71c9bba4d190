use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::PgListener;
use sqlx::PgPool;

use crate::kernel::{BaseNotificationChannel, NotificationListener};

/// Channel the `news_entries_notify` trigger publishes on.
/// Payload format: `<topic>:<entry id>`
pub const NOTIFY_CHANNEL: &str = "news_updates";

/// LISTEN/NOTIFY source. Every listener takes its own dedicated connection.
pub struct PgNotificationChannel {
    pool: PgPool,
}

impl PgNotificationChannel {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BaseNotificationChannel for PgNotificationChannel {
    async fn listen(&self) -> Result<Box<dyn NotificationListener>> {
        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .context("Failed to open notification connection")?;
        listener
            .listen(NOTIFY_CHANNEL)
            .await
            .with_context(|| format!("Failed to LISTEN on {}", NOTIFY_CHANNEL))?;

        tracing::info!(channel = NOTIFY_CHANNEL, "Listening for change notifications");
        Ok(Box::new(PgNotificationListener { listener }))
    }
}

pub struct PgNotificationListener {
    listener: PgListener,
}

#[async_trait]
impl NotificationListener for PgNotificationListener {
    async fn poll(&mut self, timeout: Duration) -> Result<Vec<String>> {
        let first = match tokio::time::timeout(timeout, self.listener.try_recv()).await {
            Err(_) => return Ok(Vec::new()),
            Ok(result) => result.context("Failed to receive notification")?,
        };

        let Some(first) = first else {
            // PgListener reconnects and re-subscribes on the next call.
            // Anything sent while disconnected is gone.
            tracing::warn!(channel = NOTIFY_CHANNEL, "Notification connection lost, reconnecting");
            return Ok(Vec::new());
        };

        let mut payloads = vec![first.payload().to_string()];
        while let Some(next) = self.listener.next_buffered() {
            payloads.push(next.payload().to_string());
        }
        Ok(payloads)
    }

    async fn close(mut self: Box<Self>) -> Result<()> {
        self.listener
            .unlisten_all()
            .await
            .context("Failed to UNLISTEN")?;
        tracing::info!(channel = NOTIFY_CHANNEL, "Notification listener closed");
        Ok(())
    }
}

//! Change relay: database notifications -> fan-out.
//!
//! ```text
//! AFTER INSERT trigger
//!     └─► NOTIFY news_updates '<topic>:<id>'
//!             └─► ChangeRelay loop (poll every `poll_interval`)
//!                     ├─► parse payload
//!                     ├─► store.get_entry(id)
//!                     └─► hub.broadcast(topic, entry)
//! ```
//!
//! The relay is an explicit service owned by the application. `start` and
//! `stop` are idempotent. Per-notification failures are logged and skipped;
//! only a listener fault ends the loop.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use news_crawler::NewsEntryId;

use super::stream_hub::StreamHub;
use super::traits::{BaseNewsStore, BaseNotificationChannel, NotificationListener};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Parsed `"<topic>:<entryId>"` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotification {
    pub topic: String,
    pub entry_id: NewsEntryId,
}

impl ChangeNotification {
    /// Topics may contain ':' themselves, so split on the last one.
    pub fn parse(payload: &str) -> Result<Self, RelayError> {
        let malformed = || RelayError::MalformedPayload {
            payload: payload.to_string(),
        };

        let (topic, id) = payload.rsplit_once(':').ok_or_else(malformed)?;
        if topic.is_empty() {
            return Err(malformed());
        }
        let entry_id = id.parse::<NewsEntryId>().map_err(|_| malformed())?;

        Ok(Self {
            topic: topic.to_string(),
            entry_id,
        })
    }
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("malformed notification payload: {payload:?}")]
    MalformedPayload { payload: String },

    #[error("failed to resolve entry {entry_id}")]
    Resolution {
        entry_id: NewsEntryId,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to deliver to topic {topic}")]
    Delivery {
        topic: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("notification listener failed")]
    Listener(#[source] anyhow::Error),
}

impl RelayError {
    /// Fatal errors end the relay loop
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Listener(_))
    }
}

struct RunningRelay {
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

/// Bridges the notification channel to the [`StreamHub`].
pub struct ChangeRelay {
    channel: Arc<dyn BaseNotificationChannel>,
    store: Arc<dyn BaseNewsStore>,
    hub: StreamHub,
    poll_interval: Duration,
    running: Mutex<Option<RunningRelay>>,
}

impl ChangeRelay {
    pub fn new(
        channel: Arc<dyn BaseNotificationChannel>,
        store: Arc<dyn BaseNewsStore>,
        hub: StreamHub,
    ) -> Self {
        Self {
            channel,
            store,
            hub,
            poll_interval: DEFAULT_POLL_INTERVAL,
            running: Mutex::new(None),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Open a listener and spawn the relay loop.
    ///
    /// No-op while the loop is running. A loop that ended on a listener
    /// fault is replaced.
    pub async fn start(&self) -> Result<()> {
        let mut running = self.running.lock().await;
        if let Some(current) = running.as_ref() {
            if !current.handle.is_finished() {
                debug!("Change relay already running");
                return Ok(());
            }
        }

        let listener = self.channel.listen().await?;
        let shutdown = CancellationToken::new();
        let worker = RelayLoop {
            store: self.store.clone(),
            hub: self.hub.clone(),
            poll_interval: self.poll_interval,
        };
        let handle = tokio::spawn(worker.run(listener, shutdown.clone()));

        *running = Some(RunningRelay { shutdown, handle });
        info!(poll_interval_ms = self.poll_interval.as_millis() as u64, "Change relay started");
        Ok(())
    }

    /// Cancel the loop and wait for it to finish. No-op when not running.
    pub async fn stop(&self) {
        let Some(current) = self.running.lock().await.take() else {
            return;
        };

        current.shutdown.cancel();
        if let Err(e) = current.handle.await {
            error!(error = %e, "Change relay task panicked");
        }
        info!("Change relay stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .map(|r| !r.handle.is_finished())
            .unwrap_or(false)
    }
}

struct RelayLoop {
    store: Arc<dyn BaseNewsStore>,
    hub: StreamHub,
    poll_interval: Duration,
}

impl RelayLoop {
    async fn run(self, mut listener: Box<dyn NotificationListener>, shutdown: CancellationToken) {
        loop {
            let batch = tokio::select! {
                _ = shutdown.cancelled() => break,
                batch = listener.poll(self.poll_interval) => batch,
            };

            let payloads = match batch {
                Ok(payloads) => payloads,
                Err(e) => {
                    let err = RelayError::Listener(e);
                    error!(error = ?err, "Change relay stopping on listener fault");
                    break;
                }
            };

            // Handled outside the select so an in-flight batch completes
            for payload in payloads {
                if let Err(err) = self.handle(&payload).await {
                    warn!(error = ?err, "Skipping change notification");
                }
            }
        }

        if let Err(e) = listener.close().await {
            warn!(error = %e, "Failed to close notification listener");
        }
    }

    async fn handle(&self, payload: &str) -> Result<(), RelayError> {
        let notification = ChangeNotification::parse(payload)?;

        let entry = self
            .store
            .get_entry(notification.entry_id)
            .await
            .map_err(|source| RelayError::Resolution {
                entry_id: notification.entry_id,
                source,
            })?;

        let Some(entry) = entry else {
            debug!(entry_id = %notification.entry_id, "Notified entry no longer exists");
            return Ok(());
        };

        let delivered = self
            .hub
            .broadcast(&notification.topic, &entry)
            .await
            .map_err(|source| RelayError::Delivery {
                topic: notification.topic.clone(),
                source,
            })?;

        debug!(
            topic = %notification.topic,
            entry_id = %notification.entry_id,
            delivered,
            "Relayed news entry"
        );
        Ok(())
    }
}

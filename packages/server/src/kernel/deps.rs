//! Server dependencies shared by HTTP handlers and background services.
//!
//! All infrastructure is reached through the traits in `kernel::traits`, so
//! tests can run the whole pipeline against in-memory doubles.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;

use crate::kernel::{BaseNewsStore, BaseNotificationChannel, ChangeRelay, StreamHub};
use crate::storage::{PgNotificationChannel, PostgresNewsStore};

#[derive(Clone)]
pub struct ServerDeps {
    /// Present when running against PostgreSQL; used by the health probe
    pub db_pool: Option<PgPool>,
    pub store: Arc<dyn BaseNewsStore>,
    /// In-process fan-out to WebSocket subscribers
    pub stream_hub: StreamHub,
    pub relay: Arc<ChangeRelay>,
}

impl ServerDeps {
    pub fn new(
        db_pool: Option<PgPool>,
        store: Arc<dyn BaseNewsStore>,
        channel: Arc<dyn BaseNotificationChannel>,
        stream_hub: StreamHub,
        relay_poll_interval: Duration,
    ) -> Self {
        let relay = ChangeRelay::new(channel, store.clone(), stream_hub.clone())
            .with_poll_interval(relay_poll_interval);
        Self {
            db_pool,
            store,
            stream_hub,
            relay: Arc::new(relay),
        }
    }

    /// Wire everything to PostgreSQL
    pub fn postgres(pool: PgPool, stream_hub: StreamHub, relay_poll_interval: Duration) -> Self {
        Self::new(
            Some(pool.clone()),
            Arc::new(PostgresNewsStore::new(pool.clone())),
            Arc::new(PgNotificationChannel::new(pool)),
            stream_hub,
            relay_poll_interval,
        )
    }
}

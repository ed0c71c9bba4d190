//! PostgreSQL-backed implementations of the kernel infrastructure traits.

pub mod notifications;
pub mod postgres;
pub mod retry;

pub use notifications::{PgNotificationChannel, PgNotificationListener, NOTIFY_CHANNEL};
pub use postgres::PostgresNewsStore;
pub use retry::{is_transient, with_retry, RetryPolicy};

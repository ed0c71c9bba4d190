//! Kernel module - server infrastructure and dependencies.

pub mod change_relay;
pub mod deps;
pub mod scheduled_tasks;
pub mod stream_hub;
pub mod test_dependencies;
pub mod traits;

pub use change_relay::{ChangeNotification, ChangeRelay, RelayError};
pub use deps::ServerDeps;
pub use scheduled_tasks::{run_crawl_cycle, start_scheduler, CrawlCycleStats, CrawlWorker};
pub use stream_hub::{Connection, ConnectionId, ConnectionState, StreamHub};
pub use test_dependencies::{MemoryNewsStore, MockPageFetcher};
pub use traits::*;

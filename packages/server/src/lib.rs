// TopicStreams - server core
//
// Persistence gateway, change relay and WebSocket fan-out for crawled news.
// The crawl engine itself lives in the news-crawler package.

pub mod config;
pub mod kernel;
pub mod server;
pub mod storage;

pub use config::*;

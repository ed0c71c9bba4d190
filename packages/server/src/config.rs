use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub port: u16,
    /// Upper bound on how long the change relay waits per poll
    pub relay_poll_interval: Duration,
    /// Upper bound on a single delivery to one subscriber
    pub broadcast_send_timeout: Duration,
    /// Outbound queue length per real-time connection
    pub subscriber_buffer: usize,
    pub crawler_enabled: bool,
    /// Cron expression (with seconds) for the crawl cycle
    pub scrape_schedule: String,
    pub scrape_max_pages: Option<i64>,
    pub scrape_page_delay: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            database_max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 10)?,
            port: parse_or("PORT", 8080)?,
            relay_poll_interval: Duration::from_millis(parse_or("RELAY_POLL_INTERVAL_MS", 100)?),
            broadcast_send_timeout: Duration::from_millis(parse_or(
                "BROADCAST_SEND_TIMEOUT_MS",
                5000,
            )?),
            subscriber_buffer: parse_or("SUBSCRIBER_BUFFER", 64)?,
            crawler_enabled: parse_or("CRAWLER_ENABLED", true)?,
            scrape_schedule: env::var("SCRAPE_SCHEDULE")
                .unwrap_or_else(|_| "0 */5 * * * *".to_string()),
            scrape_max_pages: env::var("SCRAPE_MAX_PAGES")
                .ok()
                .map(|v| v.parse())
                .transpose()
                .context("SCRAPE_MAX_PAGES must be a valid number")?,
            scrape_page_delay: Duration::from_millis(parse_or("SCRAPE_PAGE_DELAY_MS", 1000)?),
        })
    }
}

fn parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid value", name)),
        Err(_) => Ok(default),
    }
}

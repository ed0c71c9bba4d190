// Main entry point for the TopicStreams server

use std::sync::Arc;

use anyhow::{Context, Result};
use news_crawler::{CrawlConfig, Crawler, HttpPageFetcher, SearchResultParser};
use server_core::kernel::{CrawlWorker, ServerDeps, StreamHub};
use server_core::{server::build_app, Config};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "info,server_core=debug,news_crawler=debug,sqlx=warn".into()
            }),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_line_number(true),
        )
        .init();

    tracing::info!("Starting TopicStreams server");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    tracing::info!("Configuration loaded");

    // Connect to database
    tracing::info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connected");

    // Run migrations
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run migrations")?;
    tracing::info!("Migrations complete");

    let stream_hub =
        StreamHub::with_limits(config.subscriber_buffer, config.broadcast_send_timeout);
    let deps = ServerDeps::postgres(pool, stream_hub, config.relay_poll_interval);

    deps.relay
        .start()
        .await
        .context("Failed to start change relay")?;

    let crawl_worker = if config.crawler_enabled {
        let crawler = Crawler::new(
            Arc::new(HttpPageFetcher::new()?),
            Arc::new(SearchResultParser::new()?),
            CrawlConfig::default()
                .with_max_pages(config.scrape_max_pages)
                .with_page_delay(config.scrape_page_delay),
        );
        let worker = CrawlWorker::spawn(
            deps.store.clone(),
            Arc::new(crawler),
            config.scrape_schedule.clone(),
        )
        .await
        .context("Failed to start crawl worker")?;
        Some(worker)
    } else {
        tracing::info!("Crawler disabled");
        None
    };

    let app = build_app(&deps);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!("Starting server on {}", addr);
    tracing::info!("WebSocket: ws://localhost:{}/api/v1/ws/news/{{topic}}", config.port);
    tracing::info!("Health check: http://localhost:{}/health", config.port);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Shutting down");
    deps.relay.stop().await;
    if let Some(worker) = crawl_worker {
        worker.stop().await?;
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

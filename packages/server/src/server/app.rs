//! Application setup and server configuration.

use std::sync::Arc;

use axum::{
    extract::Extension,
    http::{header::CONTENT_TYPE, Method},
    routing::{delete, get},
    Router,
};
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::kernel::{BaseNewsStore, ChangeRelay, ServerDeps, StreamHub};
use crate::server::routes::{
    add_topic_handler, delete_topic_handler, health_handler, list_logs_handler,
    list_news_handler, list_topics_handler, news_stream_handler,
};

/// Shared application state
#[derive(Clone)]
pub struct AxumAppState {
    pub db_pool: Option<PgPool>,
    pub store: Arc<dyn BaseNewsStore>,
    pub stream_hub: StreamHub,
    pub relay: Arc<ChangeRelay>,
}

impl From<&ServerDeps> for AxumAppState {
    fn from(deps: &ServerDeps) -> Self {
        Self {
            db_pool: deps.db_pool.clone(),
            store: deps.store.clone(),
            stream_hub: deps.stream_hub.clone(),
            relay: deps.relay.clone(),
        }
    }
}

/// Build the Axum application router
///
/// Background services (change relay, crawl worker) are started by the
/// caller; the router only needs handles to them.
pub fn build_app(deps: &ServerDeps) -> Router {
    let app_state = AxumAppState::from(deps);

    // CORS configuration - allow any origin
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([CONTENT_TYPE]);

    let api = Router::new()
        .route("/topics", get(list_topics_handler).post(add_topic_handler))
        .route("/topics/:name", delete(delete_topic_handler))
        .route("/news/:topic", get(list_news_handler))
        .route("/logs", get(list_logs_handler))
        .route("/ws/news/:topic", get(news_stream_handler));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/api/v1", api)
        .layer(Extension(app_state))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

use axum::{
    extract::{Extension, Query},
    Json,
};
use serde::Deserialize;

use news_crawler::ScraperLog;

use super::news::page_limit;
use crate::server::app::AxumAppState;
use crate::server::error::ApiError;

#[derive(Deserialize)]
pub struct LogsQuery {
    limit: Option<i64>,
}

/// Most recent crawl logs, newest first
pub async fn list_logs_handler(
    Extension(state): Extension<AxumAppState>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<Vec<ScraperLog>>, ApiError> {
    let limit = page_limit(query.limit)?;
    Ok(Json(state.store.recent_logs(limit).await?))
}

use axum::{
    extract::{Extension, Path, Query},
    Json,
};
use serde::{Deserialize, Serialize};

use news_crawler::NewsEntry;

use crate::server::app::AxumAppState;
use crate::server::error::{validated_topic, ApiError};

const DEFAULT_PAGE_LIMIT: i64 = 20;
const MAX_PAGE_LIMIT: i64 = 100;

#[derive(Deserialize)]
pub struct NewsQuery {
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NewsPage {
    /// Normalized topic name
    pub topic: String,
    pub entries: Vec<NewsEntry>,
    /// All entries stored for the topic
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

pub async fn list_news_handler(
    Extension(state): Extension<AxumAppState>,
    Path(topic): Path<String>,
    Query(query): Query<NewsQuery>,
) -> Result<Json<NewsPage>, ApiError> {
    let topic = validated_topic(&topic)?;
    let limit = page_limit(query.limit)?;
    let offset = query.offset.unwrap_or(0);
    if offset < 0 {
        return Err(ApiError::validation("offset must be >= 0"));
    }

    let entries = state.store.list_entries(&topic, limit, offset).await?;
    let total = state.store.count_entries(&topic).await?;

    Ok(Json(NewsPage {
        topic,
        entries,
        total,
        limit,
        offset,
    }))
}

pub(crate) fn page_limit(limit: Option<i64>) -> Result<i64, ApiError> {
    let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT);
    if !(1..=MAX_PAGE_LIMIT).contains(&limit) {
        return Err(ApiError::validation(format!(
            "limit must be between 1 and {MAX_PAGE_LIMIT}"
        )));
    }
    Ok(limit)
}

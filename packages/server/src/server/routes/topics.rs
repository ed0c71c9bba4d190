use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use news_crawler::Topic;

use crate::server::app::AxumAppState;
use crate::server::error::{validated_topic, ApiError};

#[derive(Deserialize)]
pub struct TopicsQuery {
    /// Include soft-deleted topics
    #[serde(default)]
    all: bool,
}

#[derive(Deserialize)]
pub struct TopicCreate {
    name: String,
}

pub async fn list_topics_handler(
    Extension(state): Extension<AxumAppState>,
    Query(query): Query<TopicsQuery>,
) -> Result<Json<Vec<Topic>>, ApiError> {
    let topics = state.store.list_topics(query.all).await?;
    Ok(Json(topics))
}

pub async fn add_topic_handler(
    Extension(state): Extension<AxumAppState>,
    Json(body): Json<TopicCreate>,
) -> Result<StatusCode, ApiError> {
    let name = validated_topic(&body.name)?;
    state.store.add_topic(&name).await?;
    tracing::info!(topic = %name, "Topic added");
    Ok(StatusCode::OK)
}

/// Soft delete. Unknown topics succeed.
pub async fn delete_topic_handler(
    Extension(state): Extension<AxumAppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    let name = validated_topic(&name)?;
    state.store.delete_topic(&name).await?;
    tracing::info!(topic = %name, "Topic deactivated");
    Ok(StatusCode::OK)
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::Validation(message) => message.clone(),
            Self::Internal(e) => {
                tracing::error!(error = %format!("{e:#}"), "Request failed");
                "Internal server error".to_string()
            }
        };
        (self.status(), Json(json!({ "error": message }))).into_response()
    }
}

/// Normalize a topic taken from a path or body, enforcing 1..=100 chars
/// before and a non-empty result after normalization.
pub fn validated_topic(raw: &str) -> Result<String, ApiError> {
    let length = raw.chars().count();
    if !(1..=100).contains(&length) {
        return Err(ApiError::validation(
            "topic name must be between 1 and 100 characters",
        ));
    }

    let topic = news_crawler::normalize_topic(raw);
    if topic.is_empty() {
        return Err(ApiError::validation("topic name is empty after normalization"));
    }
    Ok(topic)
}

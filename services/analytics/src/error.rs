//! API error types and response formatting.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use blog_pipeline::StoreError;
use serde::Serialize;
use tracing::error;

/// Message returned for every store failure; the cause is only logged
pub const ANALYTICS_ERROR: &str = "Failed to get analytics data";

/// API error type that converts to appropriate HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Document store query failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// JSON error response body.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            Self::Store(err) => {
                error!(error = %err, "Failed to read analytics data");
                metrics::counter!("analytics.store.errors").increment(1);
            }
        }

        let body = ErrorResponse {
            error: ANALYTICS_ERROR.to_string(),
        };

        (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
    }
}

//! API error responses.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::application::services::{EngineError, PriceListError};
use crate::domain::market::SymbolError;

/// Body of every error response: `{"status":"error","message":...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Always `"error"`.
    pub status: String,
    /// Human-readable reason.
    pub message: String,
}

impl ErrorBody {
    /// Build an error body.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            message: message.into(),
        }
    }
}

/// Errors surfaced by the HTTP handlers.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The `symbols` parameter was empty or malformed.
    #[error(transparent)]
    InvalidSymbols(#[from] SymbolError),

    /// The `x-api-key` header did not match the configured secret.
    #[error("invalid or missing API key")]
    Unauthorized,

    /// The aggregation cycle failed.
    #[error("aggregation failed: {0}")]
    Engine(#[from] EngineError),

    /// Nothing could be priced and nothing was cached.
    #[error(transparent)]
    PricesUnavailable(#[from] PriceListError),
}

impl ApiError {
    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::InvalidSymbols(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Engine(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::PricesUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), error = %self, "Request failed");
        }
        (status, Json(ErrorBody::new(self.to_string()))).into_response()
    }
}

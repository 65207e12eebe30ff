//! Error type of the payment REST API.

use algopay::PaymentId;
use algopay::error::{ServiceError, StoreError, ValidationError};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Errors returned by the API handlers, rendered as `{"error": "..."}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request body could not be parsed.
    #[error("invalid request body: {0}")]
    InvalidBody(String),

    /// The merchant input was rejected.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No payment exists with this id.
    #[error("payment {0} not found")]
    NotFound(PaymentId),

    /// The store failed.
    #[error("internal error")]
    Internal(#[source] StoreError),
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(e) => Self::Validation(e),
            ServiceError::Store(StoreError::NotFound(id)) => Self::NotFound(id),
            ServiceError::Store(e) => Self::Internal(e),
        }
    }
}

impl ApiError {
    /// The HTTP status this error maps to.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::InvalidBody(_) | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(source) = &self {
            tracing::error!(error = %source, "request failed");
        }
        let body = serde_json::json!({ "error": self.to_string() });
        (self.status(), axum::Json(body)).into_response()
    }
}

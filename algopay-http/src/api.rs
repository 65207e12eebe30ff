//! Axum route handlers for the payment REST API.
//!
//! Endpoints:
//! - `POST /api/v1/init-payment` - open a payment request
//! - `GET /api/v1/check-payment/{id}` - status summary
//! - `GET /api/v1/payment/{id}` - full payment record
//! - `GET /health` - liveness check

use std::sync::Arc;

use algopay::service::{PaymentService, PaymentStatusView};
use algopay::{NewPayment, PaymentId, PaymentRequest};
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;

use crate::error::ApiError;
use crate::types::PaymentCreated;

/// Shared application state for the API.
pub type ApiState = Arc<PaymentService>;

/// `POST /api/v1/init-payment` - Opens a pending payment request.
///
/// # Errors
///
/// Returns 400 on a malformed body or rejected input, 500 if the store fails.
pub async fn post_init_payment(
    State(service): State<ApiState>,
    body: Result<Json<NewPayment>, JsonRejection>,
) -> Result<(StatusCode, Json<PaymentCreated>), ApiError> {
    let Json(new) = body.map_err(|e| ApiError::InvalidBody(e.body_text()))?;
    let payment = service.create_payment(new).await?;
    Ok((StatusCode::CREATED, Json(payment.into())))
}

/// `GET /api/v1/check-payment/{id}` - Returns the status of a payment.
///
/// # Errors
///
/// Returns 404 for an unknown id, 500 if the store fails.
pub async fn get_check_payment(
    State(service): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<PaymentStatusView>, ApiError> {
    let view = service.payment_status(&PaymentId::from(id)).await?;
    Ok(Json(view))
}

/// `GET /api/v1/payment/{id}` - Returns the full payment record.
///
/// # Errors
///
/// Returns 404 for an unknown id, 500 if the store fails.
pub async fn get_payment(
    State(service): State<ApiState>,
    Path(id): Path<String>,
) -> Result<Json<PaymentRequest>, ApiError> {
    let payment = service.get_payment(&PaymentId::from(id)).await?;
    Ok(Json(payment))
}

/// `GET /health` - Liveness check.
pub async fn get_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Creates an Axum [`axum::Router`] with all payment API endpoints.
pub fn api_router(state: ApiState) -> axum::Router {
    axum::Router::new()
        .route("/api/v1/init-payment", axum::routing::post(post_init_payment))
        .route("/api/v1/check-payment/{id}", axum::routing::get(get_check_payment))
        .route("/api/v1/payment/{id}", axum::routing::get(get_payment))
        .route("/health", axum::routing::get(get_health))
        .with_state(state)
}

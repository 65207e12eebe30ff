//! HTTP transport for algopay.
//!
//! Two independent halves:
//!
//! - outbound: [`WebhookClient`] delivers merchant callbacks and implements
//!   [`algopay::dispatch::CallbackSender`]
//! - inbound: [`api_router`] exposes the payment REST API over a
//!   [`PaymentService`](algopay::service::PaymentService)
//!
//! # Modules
//!
//! - [`webhook`] - Callback delivery over `reqwest`
//! - [`api`] - Axum handlers and router
//! - [`types`] - Request and response bodies of the REST API
//! - [`error`] - API error type and its JSON rendering

pub mod api;
pub mod error;
pub mod types;
pub mod webhook;

pub use api::{ApiState, api_router};
pub use error::ApiError;
pub use webhook::WebhookClient;

//! Error types for the payment reconciliation engine.
//!
//! None of these are fatal to the engine. Ledger and store failures are
//! transient and retried on the next tick; delivery failures are logged and
//! dropped; [`StoreError::NotFound`] is surfaced to the caller of a lookup.

use crate::payment::{PaymentId, PaymentStatus};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A requested status change that the payment state machine refuses.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// The payment already reached a different terminal status.
    #[error("payment is already {current}, cannot move to {requested}")]
    Terminal {
        /// The persisted status.
        current: PaymentStatus,
        /// The status that was asked for.
        requested: PaymentStatus,
    },
    /// Completion was requested without naming the matching transaction.
    #[error("completing a payment requires a matched transaction id")]
    MissingTxnId,
    /// A transaction id was supplied for a status other than `completed`.
    #[error("a matched transaction id is only valid for completed payments, not {status}")]
    UnexpectedTxnId {
        /// The status the id was supplied with.
        status: PaymentStatus,
    },
    /// The payment was completed by a different transaction.
    #[error("payment already completed by {existing}, refusing {requested}")]
    ConflictingTxnId {
        /// Transaction id already recorded.
        existing: String,
        /// Transaction id that was offered.
        requested: String,
    },
}

/// Merchant input that cannot become a payment request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Requested amount was zero.
    #[error("amount must be greater than 0")]
    ZeroAmount,
    /// Payee address was empty.
    #[error("payee address is required")]
    EmptyAddress,
    /// Payee address is not valid on the target ledger.
    #[error("invalid payee address {address}: {reason}")]
    InvalidAddress {
        /// The rejected address.
        address: String,
        /// Why the ledger rejected it.
        reason: String,
    },
    /// Callback URL does not use `http` or `https`.
    #[error("callback url must use http or https, got {scheme}")]
    UnsupportedCallbackScheme {
        /// The rejected URL scheme.
        scheme: String,
    },
}

/// Failure of a [`PaymentStore`](crate::store::PaymentStore) operation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No payment exists with this id.
    #[error("payment {0} not found")]
    NotFound(PaymentId),
    /// A payment with this id already exists.
    #[error("payment {0} already exists")]
    Duplicate(PaymentId),
    /// The persisted status does not allow the requested change.
    #[error("payment {id}: {source}")]
    Transition {
        /// Payment the transition was attempted on.
        id: PaymentId,
        /// Why the state machine refused.
        #[source]
        source: TransitionError,
    },
    /// The storage backend failed.
    #[error("store backend error: {context}: {source}")]
    Backend {
        /// Human-readable context.
        context: &'static str,
        /// The underlying error.
        #[source]
        source: BoxError,
    },
}

impl StoreError {
    /// Wraps a backend failure with a short description of the operation.
    pub fn backend(context: &'static str, source: impl Into<BoxError>) -> Self {
        Self::Backend {
            context,
            source: source.into(),
        }
    }
}

/// Failure of a [`LedgerQuery`](crate::ledger::LedgerQuery) call.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// The node or indexer could not be reached or answered with an error.
    #[error("ledger unavailable: {context}: {source}")]
    Unavailable {
        /// Human-readable context.
        context: &'static str,
        /// The underlying transport or status error.
        #[source]
        source: BoxError,
    },
    /// The ledger answered with data that cannot be interpreted.
    #[error("malformed ledger response: {context}: {message}")]
    Malformed {
        /// Human-readable context.
        context: &'static str,
        /// What was wrong with the response.
        message: String,
    },
}

/// A failed callback delivery. Logged and dropped, never retried.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The request could not be sent or no response arrived in time.
    #[error("callback transport error: {0}")]
    Transport(#[source] BoxError),
    /// The merchant endpoint answered with a non-2xx status.
    #[error("callback returned HTTP {status}")]
    Status {
        /// HTTP status code returned by the callback target.
        status: u16,
    },
    /// The payload could not be encoded.
    #[error("callback payload encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A reconciliation tick that was skipped as a whole.
///
/// The watermark is left untouched and the next tick retries.
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    /// Reading the latest confirmed height failed.
    #[error("reading latest height: {0}")]
    Ledger(#[from] QueryError),
    /// Listing active payments failed.
    #[error("listing active payments: {0}")]
    Store(#[from] StoreError),
}

/// The notification consumer is gone; no further events can be queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("notification queue is closed")]
pub struct QueueClosed;

/// Failure of a [`PaymentService`](crate::service::PaymentService) operation.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The merchant input was rejected.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The store failed or the payment does not exist.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ServiceError {
    /// Returns `true` when the requested payment does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Store(StoreError::NotFound(_)))
    }
}

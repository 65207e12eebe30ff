//! Persistence port for payment requests.
//!
//! The store is the authority on payment status. Every status change goes
//! through [`PaymentStore::update_status`], which re-reads the persisted
//! record and applies [`PaymentRequest::transition`] atomically, so two tasks
//! racing to move the same payment out of `pending` cannot both succeed.
//!
//! # Implementations
//!
//! - [`memory::InMemoryPaymentStore`] - process-local, for tests and
//!   single-run deployments
//! - `rocksdb::RocksDbPaymentStore` - persistent, behind the
//!   `storage-rocksdb` feature

use async_trait::async_trait;

use crate::error::StoreError;
use crate::payment::{PaymentId, PaymentRequest, PaymentStatus, Transition};
use crate::timestamp::UnixTimestamp;

pub mod memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;

/// Result of a status update accepted by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    /// The record as persisted after the update.
    pub payment: PaymentRequest,
    /// Whether the update changed anything.
    pub transition: Transition,
}

/// Durable keyed storage of payment requests.
///
/// Time-dependent operations take `now` explicitly; production callers pass
/// [`UnixTimestamp::now`].
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Persists a new payment request.
    ///
    /// # Errors
    ///
    /// [`StoreError::Duplicate`] if the id is taken, or a backend error.
    async fn create_payment(&self, payment: PaymentRequest) -> Result<(), StoreError>;

    /// Fetches a payment request by id.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if no such payment exists, or a backend error.
    async fn get_payment(&self, id: &PaymentId) -> Result<PaymentRequest, StoreError>;

    /// Lists payments that are `pending` with `expires_at > now`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a backend error if the store cannot be read.
    async fn list_active_payments(&self, now: UnixTimestamp)
    -> Result<Vec<PaymentRequest>, StoreError>;

    /// Moves a payment to `status` after re-checking its persisted status.
    ///
    /// Reapplying the same terminal status is a no-op reported as
    /// [`Transition::Unchanged`].
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`], [`StoreError::Transition`] when the state
    /// machine refuses the change, or a backend error.
    async fn update_status(
        &self,
        id: &PaymentId,
        status: PaymentStatus,
        matched_txn_id: Option<String>,
        now: UnixTimestamp,
    ) -> Result<StatusChange, StoreError>;

    /// Expires every `pending` payment with `expires_at <= now` in one bulk
    /// operation and returns the records it changed.
    ///
    /// # Errors
    ///
    /// Returns a backend error; in that case no payment was expired.
    async fn expire_overdue(&self, now: UnixTimestamp) -> Result<Vec<PaymentRequest>, StoreError>;
}

/// Applies a status change to a loaded record, mapping refusals to
/// [`StoreError::Transition`].
pub(crate) fn apply_status(
    mut payment: PaymentRequest,
    status: PaymentStatus,
    matched_txn_id: Option<String>,
    now: UnixTimestamp,
) -> Result<StatusChange, StoreError> {
    match payment.transition(status, matched_txn_id, now) {
        Ok(transition) => Ok(StatusChange {
            payment,
            transition,
        }),
        Err(source) => Err(StoreError::Transition {
            id: payment.id,
            source,
        }),
    }
}

//! Merchant-facing operations on payment requests.
//!
//! The service opens new requests and answers lookups. It never changes the
//! status of an existing request; that is the engine's job.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::ledger::LedgerQuery;
use crate::payment::{NewPayment, PaymentId, PaymentRequest, PaymentStatus};
use crate::store::PaymentStore;
use crate::timestamp::UnixTimestamp;

/// Default lifetime of a payment request before it expires.
pub const DEFAULT_PAYMENT_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Summary returned when a merchant polls a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentStatusView {
    /// Id of the payment request.
    pub payment_id: PaymentId,
    /// Current status.
    pub status: PaymentStatus,
    /// Matched transaction, once completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub txn_id: Option<String>,
    /// Creation time.
    pub created_at: UnixTimestamp,
    /// Time of the last status change.
    pub updated_at: UnixTimestamp,
}

impl From<PaymentRequest> for PaymentStatusView {
    fn from(payment: PaymentRequest) -> Self {
        Self {
            payment_id: payment.id,
            status: payment.status,
            txn_id: payment.matched_txn_id,
            created_at: payment.created_at,
            updated_at: payment.updated_at,
        }
    }
}

/// Creates and looks up payment requests.
#[derive(Clone)]
pub struct PaymentService {
    store: Arc<dyn PaymentStore>,
    ledger: Arc<dyn LedgerQuery>,
    timeout: Duration,
}

impl std::fmt::Debug for PaymentService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaymentService")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl PaymentService {
    /// Creates a service using [`DEFAULT_PAYMENT_TIMEOUT`].
    #[must_use]
    pub fn new(store: Arc<dyn PaymentStore>, ledger: Arc<dyn LedgerQuery>) -> Self {
        Self {
            store,
            ledger,
            timeout: DEFAULT_PAYMENT_TIMEOUT,
        }
    }

    /// Sets how long new requests stay open.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// How long new requests stay open.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Validates merchant input and persists a new pending request.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Validation`] for bad input or an address the ledger
    /// rejects, [`ServiceError::Store`] if persisting fails.
    pub async fn create_payment(&self, new: NewPayment) -> Result<PaymentRequest, ServiceError> {
        new.validate()?;
        self.ledger.validate_address(&new.payee_address)?;

        let payment = PaymentRequest::open(new, self.timeout, UnixTimestamp::now());
        self.store.create_payment(payment.clone()).await?;

        tracing::info!(
            payment_id = %payment.id,
            payee = %payment.payee_address,
            amount = payment.amount,
            asset_id = payment.asset_id,
            expires_at = %payment.expires_at,
            "payment request created"
        );
        Ok(payment)
    }

    /// Fetches the full payment record.
    ///
    /// # Errors
    ///
    /// [`ServiceError::Store`]; check [`ServiceError::is_not_found`] for an
    /// unknown id.
    pub async fn get_payment(&self, id: &PaymentId) -> Result<PaymentRequest, ServiceError> {
        Ok(self.store.get_payment(id).await?)
    }

    /// Fetches the status summary of a payment.
    ///
    /// # Errors
    ///
    /// Same as [`get_payment`](Self::get_payment).
    pub async fn payment_status(&self, id: &PaymentId) -> Result<PaymentStatusView, ServiceError> {
        self.get_payment(id).await.map(PaymentStatusView::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidationError;
    use crate::store::memory::InMemoryPaymentStore;
    use crate::testing::StaticLedger;

    fn service(store: &InMemoryPaymentStore) -> PaymentService {
        PaymentService::new(Arc::new(store.clone()), Arc::new(StaticLedger::new(0)))
    }

    fn new_payment(payee: &str, amount: u64) -> NewPayment {
        NewPayment {
            payee_address: payee.into(),
            amount,
            asset_id: 0,
            callback_target: None,
        }
    }

    #[tokio::test]
    async fn test_create_opens_pending_with_default_timeout() {
        let store = InMemoryPaymentStore::new();
        let payment = service(&store)
            .create_payment(new_payment("PAYEE", 1_000_000))
            .await
            .unwrap();

        assert_eq!(payment.status, PaymentStatus::Pending);
        assert!(payment.matched_txn_id.is_none());
        assert_eq!(
            payment.expires_at.as_secs() - payment.created_at.as_secs(),
            DEFAULT_PAYMENT_TIMEOUT.as_secs()
        );
        assert_eq!(store.get_payment(&payment.id).await.unwrap(), payment);
    }

    #[tokio::test]
    async fn test_custom_timeout() {
        let store = InMemoryPaymentStore::new();
        let svc = service(&store).with_timeout(Duration::from_secs(120));
        let payment = svc.create_payment(new_payment("PAYEE", 1)).await.unwrap();
        assert_eq!(payment.expires_at.as_secs() - payment.created_at.as_secs(), 120);
    }

    #[tokio::test]
    async fn test_rejects_invalid_input() {
        let store = InMemoryPaymentStore::new();
        let svc = service(&store);

        let err = svc.create_payment(new_payment("PAYEE", 0)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(ValidationError::ZeroAmount)));

        let err = svc.create_payment(new_payment("payee", 5)).await.unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Validation(ValidationError::InvalidAddress { .. })
        ));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_status_view_and_not_found() {
        let store = InMemoryPaymentStore::new();
        let svc = service(&store);
        let payment = svc.create_payment(new_payment("PAYEE", 7)).await.unwrap();
        store
            .update_status(
                &payment.id,
                PaymentStatus::Completed,
                Some("TX".into()),
                UnixTimestamp::now(),
            )
            .await
            .unwrap();

        let view = svc.payment_status(&payment.id).await.unwrap();
        assert_eq!(view.status, PaymentStatus::Completed);
        assert_eq!(view.txn_id.as_deref(), Some("TX"));

        let err = svc.payment_status(&PaymentId::from("missing")).await.unwrap_err();
        assert!(err.is_not_found());
    }
}

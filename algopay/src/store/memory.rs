use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{PaymentStore, StatusChange, apply_status};
use crate::error::StoreError;
use crate::payment::{PaymentId, PaymentRequest, PaymentStatus, Transition};
use crate::timestamp::UnixTimestamp;

/// A thread-safe in-memory payment store.
///
/// Uses `Arc<RwLock<HashMap<PaymentId, PaymentRequest>>>`; clones share the
/// same map. Writers hold the lock across read-check-write, which serializes
/// conflicting status updates.
#[derive(Debug, Default, Clone)]
pub struct InMemoryPaymentStore {
    payments: Arc<RwLock<HashMap<PaymentId, PaymentRequest>>>,
}

impl InMemoryPaymentStore {
    /// Creates a new, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored payments, in any status.
    pub async fn len(&self) -> usize {
        self.payments.read().await.len()
    }

    /// Returns `true` if nothing has been stored.
    pub async fn is_empty(&self) -> bool {
        self.payments.read().await.is_empty()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn create_payment(&self, payment: PaymentRequest) -> Result<(), StoreError> {
        let mut payments = self.payments.write().await;
        match payments.entry(payment.id.clone()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(payment.id)),
            Entry::Vacant(slot) => {
                slot.insert(payment);
                Ok(())
            }
        }
    }

    async fn get_payment(&self, id: &PaymentId) -> Result<PaymentRequest, StoreError> {
        let payments = self.payments.read().await;
        payments
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn list_active_payments(
        &self,
        now: UnixTimestamp,
    ) -> Result<Vec<PaymentRequest>, StoreError> {
        let payments = self.payments.read().await;
        let mut active: Vec<PaymentRequest> = payments
            .values()
            .filter(|p| p.is_active(now))
            .cloned()
            .collect();
        active.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(active)
    }

    async fn update_status(
        &self,
        id: &PaymentId,
        status: PaymentStatus,
        matched_txn_id: Option<String>,
        now: UnixTimestamp,
    ) -> Result<StatusChange, StoreError> {
        let mut payments = self.payments.write().await;
        let current = payments
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let change = apply_status(current, status, matched_txn_id, now)?;
        if change.transition == Transition::Applied {
            payments.insert(id.clone(), change.payment.clone());
        }
        Ok(change)
    }

    async fn expire_overdue(&self, now: UnixTimestamp) -> Result<Vec<PaymentRequest>, StoreError> {
        let mut payments = self.payments.write().await;
        let mut expired = Vec::new();
        for payment in payments.values_mut().filter(|p| p.is_overdue(now)) {
            // Overdue implies pending, so this cannot be refused.
            if payment.transition(PaymentStatus::Expired, None, now).is_ok() {
                expired.push(payment.clone());
            }
        }
        Ok(expired)
    }
}

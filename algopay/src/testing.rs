//! In-process fakes of the engine's ports for unit tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::dispatch::{CallbackSender, WebhookPayload};
use crate::error::{DeliveryError, QueryError, StoreError, ValidationError};
use crate::ledger::{AssetFilter, LedgerQuery, MatchedTransaction};
use crate::payment::{PaymentId, PaymentRequest, PaymentStatus};
use crate::store::{PaymentStore, StatusChange};
use crate::store::memory::InMemoryPaymentStore;
use crate::timestamp::UnixTimestamp;

pub(crate) fn transfer(
    txn_id: &str,
    receiver: &str,
    amount: u64,
    asset_id: u64,
    height: u64,
) -> MatchedTransaction {
    MatchedTransaction {
        txn_id: txn_id.to_owned(),
        sender_address: "SENDER".to_owned(),
        receiver_address: receiver.to_owned(),
        amount,
        asset_id,
        confirmed_height: height,
        confirmed_at: UnixTimestamp::from_secs(1_700_000_000 + height),
    }
}

fn unavailable(context: &'static str) -> QueryError {
    QueryError::Unavailable {
        context,
        source: "connection refused".into(),
    }
}

/// Ledger backed by a vector, filtering the way an indexer would.
#[derive(Debug, Default)]
pub(crate) struct StaticLedger {
    height: AtomicU64,
    txns: Mutex<Vec<MatchedTransaction>>,
    fail_height: AtomicBool,
    fail_transactions: AtomicBool,
    last_min_height: Mutex<Option<u64>>,
}

impl StaticLedger {
    pub(crate) fn new(height: u64) -> Self {
        Self {
            height: AtomicU64::new(height),
            ..Self::default()
        }
    }

    pub(crate) fn push(&self, txn: MatchedTransaction) {
        self.txns.lock().unwrap().push(txn);
    }

    pub(crate) fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::SeqCst);
    }

    pub(crate) fn fail_height(&self, fail: bool) {
        self.fail_height.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_transactions(&self, fail: bool) {
        self.fail_transactions.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn last_min_height(&self) -> Option<u64> {
        *self.last_min_height.lock().unwrap()
    }
}

#[async_trait]
impl LedgerQuery for StaticLedger {
    async fn latest_height(&self) -> Result<u64, QueryError> {
        if self.fail_height.load(Ordering::SeqCst) {
            return Err(unavailable("GET /v2/status"));
        }
        Ok(self.height.load(Ordering::SeqCst))
    }

    async fn transactions_to(
        &self,
        address: &str,
        min_height: u64,
        filter: AssetFilter,
    ) -> Result<Vec<MatchedTransaction>, QueryError> {
        *self.last_min_height.lock().unwrap() = Some(min_height);
        if self.fail_transactions.load(Ordering::SeqCst) {
            return Err(unavailable("GET /v2/accounts/{address}/transactions"));
        }
        let txns = self.txns.lock().unwrap();
        Ok(txns
            .iter()
            .filter(|t| t.receiver_address == address)
            .filter(|t| t.confirmed_height >= min_height)
            .filter(|t| match filter {
                AssetFilter::Native => t.asset_id == 0,
                AssetFilter::Asset(id) => t.asset_id == id,
            })
            .cloned()
            .collect())
    }

    fn validate_address(&self, address: &str) -> Result<(), ValidationError> {
        if address.chars().all(|c| c.is_ascii_uppercase()) {
            Ok(())
        } else {
            Err(ValidationError::InvalidAddress {
                address: address.to_owned(),
                reason: "expected uppercase letters".to_owned(),
            })
        }
    }
}

/// In-memory store whose list and update operations can be made to fail.
#[derive(Debug, Default)]
pub(crate) struct FlakyStore {
    pub(crate) inner: InMemoryPaymentStore,
    fail_list: AtomicBool,
    fail_update: AtomicBool,
}

impl FlakyStore {
    pub(crate) fn fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_update(&self, fail: bool) {
        self.fail_update.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentStore for FlakyStore {
    async fn create_payment(&self, payment: PaymentRequest) -> Result<(), StoreError> {
        self.inner.create_payment(payment).await
    }

    async fn get_payment(&self, id: &PaymentId) -> Result<PaymentRequest, StoreError> {
        self.inner.get_payment(id).await
    }

    async fn list_active_payments(
        &self,
        now: UnixTimestamp,
    ) -> Result<Vec<PaymentRequest>, StoreError> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(StoreError::backend("list active", "disk unavailable"));
        }
        self.inner.list_active_payments(now).await
    }

    async fn update_status(
        &self,
        id: &PaymentId,
        status: PaymentStatus,
        matched_txn_id: Option<String>,
        now: UnixTimestamp,
    ) -> Result<StatusChange, StoreError> {
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(StoreError::backend("update status", "disk unavailable"));
        }
        self.inner.update_status(id, status, matched_txn_id, now).await
    }

    async fn expire_overdue(&self, now: UnixTimestamp) -> Result<Vec<PaymentRequest>, StoreError> {
        self.inner.expire_overdue(now).await
    }
}

/// Callback sender that records payloads and answers with a fixed outcome.
#[derive(Debug, Default)]
pub(crate) struct RecordingCallbacks {
    delivered: Mutex<Vec<(Url, WebhookPayload)>>,
    reject_with: Mutex<Option<u16>>,
    delay: Mutex<Duration>,
}

impl RecordingCallbacks {
    pub(crate) fn reject_with(&self, status: u16) {
        *self.reject_with.lock().unwrap() = Some(status);
    }

    pub(crate) fn delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub(crate) fn delivered(&self) -> Vec<(Url, WebhookPayload)> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl CallbackSender for RecordingCallbacks {
    async fn deliver(&self, target: &Url, payload: &WebhookPayload) -> Result<(), DeliveryError> {
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.delivered
            .lock()
            .unwrap()
            .push((target.clone(), payload.clone()));
        match *self.reject_with.lock().unwrap() {
            Some(status) => Err(DeliveryError::Status { status }),
            None => Ok(()),
        }
    }
}

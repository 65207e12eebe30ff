use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use tokio::sync::Mutex;

use super::{PaymentStore, StatusChange, apply_status};
use crate::error::StoreError;
use crate::payment::{PaymentId, PaymentRequest, PaymentStatus, Transition};
use crate::timestamp::UnixTimestamp;

/// Column family holding JSON-encoded payment requests keyed by id.
pub const CF_PAYMENTS: &str = "payments";

/// A persistent payment store backed by RocksDB.
///
/// Database calls run on Tokio's blocking pool. Writes that depend on the persisted
/// status (create, status update, expiry) run under a single write mutex so
/// the re-check and the write cannot interleave with another writer.
///
/// `Clone` shares the underlying `Arc<DB>` and the write mutex.
#[derive(Clone)]
pub struct RocksDbPaymentStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl std::fmt::Debug for RocksDbPaymentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksDbPaymentStore")
            .field("path", &self.db.path())
            .finish_non_exhaustive()
    }
}

impl RocksDbPaymentStore {
    /// Opens or creates a database at `path` with the `payments` column family.
    ///
    /// # Errors
    ///
    /// Returns a backend error if RocksDB cannot open the path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf = ColumnFamilyDescriptor::new(CF_PAYMENTS, Options::default());
        let db = DB::open_cf_descriptors(&opts, path, vec![cf])
            .map_err(|e| StoreError::backend("opening database", e))?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Runs `op` against the database on the blocking thread pool.
    async fn blocking<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&DB) -> Result<T, StoreError> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || op(&db))
            .await
            .map_err(|e| StoreError::backend("joining database task", e))?
    }
}

fn cf(db: &DB) -> Result<&ColumnFamily, StoreError> {
    db.cf_handle(CF_PAYMENTS).ok_or_else(|| {
        StoreError::backend("resolving column family", "payments column family not found")
    })
}

fn load(db: &DB, id: &PaymentId) -> Result<Option<PaymentRequest>, StoreError> {
    let bytes = db
        .get_cf(cf(db)?, id.as_str().as_bytes())
        .map_err(|e| StoreError::backend("reading payment", e))?;
    bytes
        .map(|b| serde_json::from_slice(&b).map_err(|e| StoreError::backend("decoding payment", e)))
        .transpose()
}

fn save(db: &DB, payment: &PaymentRequest) -> Result<(), StoreError> {
    let value =
        serde_json::to_vec(payment).map_err(|e| StoreError::backend("encoding payment", e))?;
    db.put_cf(cf(db)?, payment.id.as_str().as_bytes(), value)
        .map_err(|e| StoreError::backend("writing payment", e))
}

fn scan(db: &DB) -> Result<Vec<PaymentRequest>, StoreError> {
    let mut payments = Vec::new();
    for item in db.iterator_cf(cf(db)?, IteratorMode::Start) {
        let (_key, value) = item.map_err(|e| StoreError::backend("iterating payments", e))?;
        let payment: PaymentRequest = serde_json::from_slice(&value)
            .map_err(|e| StoreError::backend("decoding payment", e))?;
        payments.push(payment);
    }
    Ok(payments)
}

fn expire(db: &DB, now: UnixTimestamp) -> Result<Vec<PaymentRequest>, StoreError> {
    let mut batch = WriteBatch::default();
    let mut expired = Vec::new();
    for mut payment in scan(db)?.into_iter().filter(|p| p.is_overdue(now)) {
        if payment.transition(PaymentStatus::Expired, None, now).is_err() {
            continue;
        }
        let value =
            serde_json::to_vec(&payment).map_err(|e| StoreError::backend("encoding payment", e))?;
        batch.put_cf(cf(db)?, payment.id.as_str().as_bytes(), value);
        expired.push(payment);
    }
    if !expired.is_empty() {
        db.write(batch)
            .map_err(|e| StoreError::backend("writing expiry batch", e))?;
    }
    Ok(expired)
}

#[async_trait]
impl PaymentStore for RocksDbPaymentStore {
    async fn create_payment(&self, payment: PaymentRequest) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        self.blocking(move |db| {
            if load(db, &payment.id)?.is_some() {
                return Err(StoreError::Duplicate(payment.id));
            }
            save(db, &payment)
        })
        .await
    }

    async fn get_payment(&self, id: &PaymentId) -> Result<PaymentRequest, StoreError> {
        let id = id.clone();
        self.blocking(move |db| load(db, &id)?.ok_or(StoreError::NotFound(id)))
            .await
    }

    async fn list_active_payments(
        &self,
        now: UnixTimestamp,
    ) -> Result<Vec<PaymentRequest>, StoreError> {
        let mut active: Vec<PaymentRequest> = self
            .blocking(scan)
            .await?
            .into_iter()
            .filter(|p| p.is_active(now))
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
        let _guard = self.write_lock.lock().await;
        let id = id.clone();
        self.blocking(move |db| {
            let current = load(db, &id)?.ok_or_else(|| StoreError::NotFound(id.clone()))?;
            let change = apply_status(current, status, matched_txn_id, now)?;
            if change.transition == Transition::Applied {
                save(db, &change.payment)?;
            }
            Ok(change)
        })
        .await
    }

    async fn expire_overdue(&self, now: UnixTimestamp) -> Result<Vec<PaymentRequest>, StoreError> {
        let _guard = self.write_lock.lock().await;
        self.blocking(move |db| expire(db, now)).await
    }
}

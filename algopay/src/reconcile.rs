//! The reconciliation loop.
//!
//! On every tick the [`Reconciler`] reads the latest confirmed height, lists
//! the active payments, and asks the matcher for a qualifying transaction
//! confirmed above the [`Watermark`]. Matches are completed in the store and
//! only then queued for notification. The watermark advances to the height
//! read at the start of the tick once every payment has been looked at.
//!
//! A failed height read or payment listing skips the whole tick; a failure on
//! one payment is logged and the tick moves on to the next one. A tick with
//! any such failure keeps the watermark, so the same range is scanned again.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::dispatch::NotificationSender;
use crate::error::TickError;
use crate::ledger::{LedgerQuery, MatchedTransaction};
use crate::matcher::TransactionMatcher;
use crate::payment::{PaymentRequest, PaymentStatus, Transition};
use crate::store::PaymentStore;
use crate::timestamp::UnixTimestamp;

/// Default time between reconciliation ticks.
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(10);

/// Highest ledger height already scanned.
///
/// Owned by a single [`Reconciler`]; it only moves forward.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Watermark(u64);

impl Watermark {
    /// A watermark at `height`.
    #[must_use]
    pub const fn new(height: u64) -> Self {
        Self(height)
    }

    /// The scanned height.
    #[must_use]
    pub const fn height(self) -> u64 {
        self.0
    }

    /// Moves the watermark to `height` if that is higher.
    ///
    /// Returns `true` if it moved. A node reporting a lower height than
    /// already scanned leaves the watermark where it is.
    pub const fn advance(&mut self, height: u64) -> bool {
        if height > self.0 {
            self.0 = height;
            true
        } else {
            false
        }
    }
}

/// Outcome of one completed tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Latest confirmed height read at the start of the tick.
    pub latest_height: u64,
    /// Active payments looked at.
    pub scanned: usize,
    /// Payments moved to `completed`.
    pub completed: usize,
    /// Payments whose lookup or update failed.
    pub failed: usize,
    /// Events handed to the notification queue.
    pub notified: usize,
}

/// Periodic driver matching active payments against the ledger.
pub struct Reconciler {
    store: Arc<dyn PaymentStore>,
    ledger: Arc<dyn LedgerQuery>,
    matcher: TransactionMatcher,
    notifications: NotificationSender,
    watermark: Watermark,
    interval: Duration,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("watermark", &self.watermark)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    /// Creates a reconciler starting from a zero watermark.
    #[must_use]
    pub fn new(
        store: Arc<dyn PaymentStore>,
        ledger: Arc<dyn LedgerQuery>,
        notifications: NotificationSender,
    ) -> Self {
        let matcher = TransactionMatcher::new(Arc::clone(&ledger));
        Self {
            store,
            ledger,
            matcher,
            notifications,
            watermark: Watermark::default(),
            interval: DEFAULT_RECONCILE_INTERVAL,
        }
    }

    /// Sets the time between ticks.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Starts scanning above `watermark` instead of zero.
    #[must_use]
    pub const fn with_watermark(mut self, watermark: Watermark) -> Self {
        self.watermark = watermark;
        self
    }

    /// The current watermark.
    #[must_use]
    pub const fn watermark(&self) -> Watermark {
        self.watermark
    }

    /// Runs one reconciliation pass.
    ///
    /// # Errors
    ///
    /// Returns [`TickError`] if the latest height or the active payments
    /// cannot be read. The watermark is left unchanged in that case, and also
    /// when any single payment failed.
    pub async fn tick(&mut self) -> Result<TickReport, TickError> {
        let latest_height = self.ledger.latest_height().await?;
        let active = self.store.list_active_payments(UnixTimestamp::now()).await?;
        let since_height = self.watermark.height();

        let mut report = TickReport {
            latest_height,
            scanned: active.len(),
            ..TickReport::default()
        };

        for payment in &active {
            match self.matcher.find_match(payment, since_height).await {
                Ok(Some(txn)) => self.complete(payment, txn, &mut report).await,
                Ok(None) => {}
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(payment_id = %payment.id, error = %e, "ledger lookup failed");
                }
            }
        }

        if report.failed > 0 {
            tracing::warn!(
                failed = report.failed,
                watermark = since_height,
                "holding watermark so failed payments are rescanned"
            );
        } else if !self.watermark.advance(latest_height) && latest_height < since_height {
            tracing::warn!(
                latest_height,
                watermark = since_height,
                "ledger reported a height below the watermark"
            );
        }
        Ok(report)
    }

    async fn complete(
        &self,
        payment: &PaymentRequest,
        txn: MatchedTransaction,
        report: &mut TickReport,
    ) {
        let change = match self
            .store
            .update_status(
                &payment.id,
                PaymentStatus::Completed,
                Some(txn.txn_id.clone()),
                UnixTimestamp::now(),
            )
            .await
        {
            Ok(change) => change,
            Err(e) => {
                report.failed += 1;
                tracing::error!(
                    payment_id = %payment.id,
                    txn_id = %txn.txn_id,
                    error = %e,
                    "failed to complete matched payment"
                );
                return;
            }
        };
        if change.transition == Transition::Unchanged {
            return;
        }

        report.completed += 1;
        tracing::info!(
            payment_id = %payment.id,
            txn_id = %txn.txn_id,
            amount = txn.amount,
            height = txn.confirmed_height,
            "payment completed"
        );

        match self.notifications.send(change.payment.into()).await {
            Ok(()) => report.notified += 1,
            Err(e) => tracing::warn!(payment_id = %payment.id, error = %e, "notification not queued"),
        }
    }

    /// Ticks every interval until `shutdown` is cancelled.
    ///
    /// The first tick fires one interval after start. Cancellation is only
    /// observed between ticks, so a running tick always finishes.
    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval = ?self.interval, "reconciliation loop started");

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            match self.tick().await {
                Ok(report) => tracing::debug!(
                    latest_height = report.latest_height,
                    scanned = report.scanned,
                    completed = report.completed,
                    failed = report.failed,
                    watermark = self.watermark.height(),
                    "reconciliation tick finished"
                ),
                Err(e) => tracing::warn!(error = %e, "reconciliation tick skipped"),
            }
        }

        tracing::info!(watermark = self.watermark.height(), "reconciliation loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{self, NotificationQueue};
    use crate::payment::NewPayment;
    use crate::store::memory::InMemoryPaymentStore;
    use crate::testing::{FlakyStore, StaticLedger, transfer};

    fn open(payee: &str, amount: u64) -> PaymentRequest {
        PaymentRequest::open(
            NewPayment {
                payee_address: payee.into(),
                amount,
                asset_id: 0,
                callback_target: None,
            },
            Duration::from_secs(1_800),
            UnixTimestamp::now(),
        )
    }

    fn reconciler(
        store: Arc<dyn PaymentStore>,
        ledger: Arc<StaticLedger>,
    ) -> (Reconciler, NotificationQueue) {
        let (tx, queue) = dispatch::channel(16);
        (Reconciler::new(store, ledger, tx), queue)
    }

    #[tokio::test]
    async fn test_match_completes_and_notifies() {
        let store = InMemoryPaymentStore::new();
        let ledger = Arc::new(StaticLedger::new(50));
        ledger.push(transfer("TX42", "A", 1_500_000, 0, 42));
        let payment = open("A", 1_000_000);
        store.create_payment(payment.clone()).await.unwrap();

        let (reconciler, mut queue) = reconciler(Arc::new(store.clone()), Arc::clone(&ledger));
        let mut reconciler = reconciler.with_watermark(Watermark::new(40));
        let report = reconciler.tick().await.unwrap();

        assert_eq!(report.completed, 1);
        assert_eq!(report.notified, 1);
        assert_eq!(reconciler.watermark().height(), 50);

        let stored = store.get_payment(&payment.id).await.unwrap();
        assert_eq!(stored.status, PaymentStatus::Completed);
        assert_eq!(stored.matched_txn_id.as_deref(), Some("TX42"));

        let event = queue.0.try_recv().unwrap();
        assert_eq!(event.payment, stored);
    }

    #[tokio::test]
    async fn test_underpayment_stays_pending() {
        let store = InMemoryPaymentStore::new();
        let ledger = Arc::new(StaticLedger::new(50));
        ledger.push(transfer("TX42", "A", 900_000, 0, 42));
        let payment = open("A", 1_000_000);
        store.create_payment(payment.clone()).await.unwrap();

        let (reconciler, mut queue) = reconciler(Arc::new(store.clone()), ledger);
        let mut reconciler = reconciler.with_watermark(Watermark::new(40));
        let report = reconciler.tick().await.unwrap();

        assert_eq!(report.completed, 0);
        assert_eq!(
            store.get_payment(&payment.id).await.unwrap().status,
            PaymentStatus::Pending
        );
        assert!(queue.0.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_matcher_uses_watermark_not_latest_height() {
        let store = InMemoryPaymentStore::new();
        let ledger = Arc::new(StaticLedger::new(50));
        store.create_payment(open("A", 1)).await.unwrap();

        let (reconciler, _queue) = reconciler(Arc::new(store), Arc::clone(&ledger));
        let mut reconciler = reconciler.with_watermark(Watermark::new(40));
        reconciler.tick().await.unwrap();
        assert_eq!(ledger.last_min_height(), Some(41));

        reconciler.tick().await.unwrap();
        assert_eq!(ledger.last_min_height(), Some(51));
    }

    #[tokio::test]
    async fn test_ledger_failure_leaves_watermark() {
        let store = InMemoryPaymentStore::new();
        let ledger = Arc::new(StaticLedger::new(50));
        let (reconciler, _queue) = reconciler(Arc::new(store), Arc::clone(&ledger));
        let mut reconciler = reconciler.with_watermark(Watermark::new(40));

        ledger.fail_height(true);
        assert!(matches!(reconciler.tick().await, Err(TickError::Ledger(_))));
        assert_eq!(reconciler.watermark().height(), 40);

        ledger.fail_height(false);
        reconciler.tick().await.unwrap();
        assert_eq!(reconciler.watermark().height(), 50);
    }

    #[tokio::test]
    async fn test_store_listing_failure_skips_tick() {
        let store = Arc::new(FlakyStore::default());
        store.fail_list(true);
        let ledger = Arc::new(StaticLedger::new(50));
        let (reconciler, _queue) = reconciler(store, ledger);
        let mut reconciler = reconciler.with_watermark(Watermark::new(40));

        assert!(matches!(reconciler.tick().await, Err(TickError::Store(_))));
        assert_eq!(reconciler.watermark().height(), 40);
    }

    #[tokio::test]
    async fn test_watermark_never_decreases() {
        let store = InMemoryPaymentStore::new();
        let ledger = Arc::new(StaticLedger::new(50));
        let (mut reconciler, _queue) = reconciler(Arc::new(store), Arc::clone(&ledger));

        reconciler.tick().await.unwrap();
        ledger.set_height(45);
        let report = reconciler.tick().await.unwrap();

        assert_eq!(report.latest_height, 45);
        assert_eq!(reconciler.watermark().height(), 50);
    }

    #[tokio::test]
    async fn test_per_payment_failure_does_not_abort_tick() {
        let store = InMemoryPaymentStore::new();
        let ledger = Arc::new(StaticLedger::new(50));
        store.create_payment(open("A", 1)).await.unwrap();
        store.create_payment(open("B", 1)).await.unwrap();
        ledger.fail_transactions(true);

        let (mut reconciler, _queue) = reconciler(Arc::new(store), Arc::clone(&ledger));
        let report = reconciler.tick().await.unwrap();

        assert_eq!(report.scanned, 2);
        assert_eq!(report.failed, 2);
        assert_eq!(reconciler.watermark().height(), 0);
    }

    #[tokio::test]
    async fn test_failed_lookup_range_is_rescanned() {
        let store = InMemoryPaymentStore::new();
        let ledger = Arc::new(StaticLedger::new(50));
        ledger.push(transfer("TX45", "A", 10, 0, 45));
        let payment = open("A", 10);
        store.create_payment(payment.clone()).await.unwrap();

        let (reconciler, mut queue) = reconciler(Arc::new(store.clone()), Arc::clone(&ledger));
        let mut reconciler = reconciler.with_watermark(Watermark::new(40));

        ledger.fail_transactions(true);
        reconciler.tick().await.unwrap();
        assert_eq!(reconciler.watermark().height(), 40);

        ledger.fail_transactions(false);
        ledger.set_height(60);
        let report = reconciler.tick().await.unwrap();

        assert_eq!(ledger.last_min_height(), Some(41));
        assert_eq!(report.completed, 1);
        assert_eq!(reconciler.watermark().height(), 60);
        assert_eq!(
            store.get_payment(&payment.id).await.unwrap().matched_txn_id.as_deref(),
            Some("TX45")
        );
        assert!(queue.0.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_one_transfer_completes_every_covered_payment() {
        let store = InMemoryPaymentStore::new();
        let ledger = Arc::new(StaticLedger::new(50));
        ledger.push(transfer("TX42", "A", 1_000, 0, 42));
        let exact = open("A", 1_000);
        let smaller = open("A", 400);
        let larger = open("A", 1_001);
        for p in [&exact, &smaller, &larger] {
            store.create_payment(p.clone()).await.unwrap();
        }

        let (reconciler, _queue) = reconciler(Arc::new(store.clone()), ledger);
        let mut reconciler = reconciler.with_watermark(Watermark::new(40));
        let report = reconciler.tick().await.unwrap();

        assert_eq!(report.completed, 2);
        for p in [&exact, &smaller] {
            let stored = store.get_payment(&p.id).await.unwrap();
            assert_eq!(stored.matched_txn_id.as_deref(), Some("TX42"));
        }
        assert_eq!(
            store.get_payment(&larger.id).await.unwrap().status,
            PaymentStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_failed_update_is_not_notified() {
        let store = Arc::new(FlakyStore::default());
        let ledger = Arc::new(StaticLedger::new(50));
        ledger.push(transfer("TX42", "A", 10, 0, 42));
        let payment = open("A", 10);
        store.create_payment(payment.clone()).await.unwrap();
        store.fail_update(true);

        let (mut reconciler, mut queue) =
            reconciler(Arc::clone(&store) as Arc<dyn PaymentStore>, ledger);
        let report = reconciler.tick().await.unwrap();

        assert_eq!(report.completed, 0);
        assert_eq!(report.failed, 1);
        assert!(queue.0.try_recv().is_err());
        assert_eq!(
            store.inner.get_payment(&payment.id).await.unwrap().status,
            PaymentStatus::Pending
        );
    }

    #[tokio::test]
    async fn test_completed_payment_is_not_rematched() {
        let store = InMemoryPaymentStore::new();
        let ledger = Arc::new(StaticLedger::new(50));
        ledger.push(transfer("FIRST", "A", 10, 0, 42));
        let payment = open("A", 10);
        store.create_payment(payment.clone()).await.unwrap();

        let (mut reconciler, mut queue) = reconciler(Arc::new(store.clone()), Arc::clone(&ledger));
        reconciler.tick().await.unwrap();

        ledger.push(transfer("SECOND", "A", 10, 0, 55));
        ledger.set_height(60);
        let report = reconciler.tick().await.unwrap();

        assert_eq!(report.scanned, 0);
        assert_eq!(
            store.get_payment(&payment.id).await.unwrap().matched_txn_id.as_deref(),
            Some("FIRST")
        );
        assert!(queue.0.try_recv().is_ok());
        assert!(queue.0.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_cancel() {
        let store = InMemoryPaymentStore::new();
        store.create_payment(open("A", 1)).await.unwrap();
        let ledger = Arc::new(StaticLedger::new(7));
        let (reconciler, _queue) = reconciler(Arc::new(store), Arc::clone(&ledger));
        let reconciler = reconciler.with_interval(Duration::from_secs(10));

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(reconciler.run(shutdown.clone()));

        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(ledger.last_min_height(), None, "first tick fires after one interval");

        time::sleep(Duration::from_secs(6)).await;
        assert_eq!(ledger.last_min_height(), Some(1));

        shutdown.cancel();
        task.await.unwrap();
    }

    #[test]
    fn test_watermark_advance() {
        let mut w = Watermark::default();
        assert!(w.advance(10));
        assert!(!w.advance(10));
        assert!(!w.advance(3));
        assert_eq!(w.height(), 10);
    }
}

//! Periodic expiry of payment requests nobody paid.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::dispatch::NotificationSender;
use crate::error::StoreError;
use crate::store::PaymentStore;
use crate::timestamp::UnixTimestamp;

/// Default time between expiry sweeps.
pub const DEFAULT_EXPIRY_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Moves overdue pending payments to `expired` on a fixed interval.
///
/// Expired payments are not notified unless a queue is attached with
/// [`ExpirySweeper::notify_via`].
pub struct ExpirySweeper {
    store: Arc<dyn PaymentStore>,
    notifications: Option<NotificationSender>,
    interval: Duration,
}

impl std::fmt::Debug for ExpirySweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpirySweeper")
            .field("interval", &self.interval)
            .field("notify", &self.notifications.is_some())
            .finish_non_exhaustive()
    }
}

impl ExpirySweeper {
    /// Creates a sweeper with the default interval and no notifications.
    #[must_use]
    pub fn new(store: Arc<dyn PaymentStore>) -> Self {
        Self {
            store,
            notifications: None,
            interval: DEFAULT_EXPIRY_INTERVAL,
        }
    }

    /// Sets the time between sweeps.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Queues every expired payment for merchant notification.
    #[must_use]
    pub fn notify_via(mut self, notifications: NotificationSender) -> Self {
        self.notifications = Some(notifications);
        self
    }

    /// Expires every payment overdue as of now and returns how many changed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the bulk update fails.
    pub async fn sweep(&self) -> Result<usize, StoreError> {
        self.sweep_at(UnixTimestamp::now()).await
    }

    /// Like [`sweep`](Self::sweep) with an explicit clock.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the bulk update fails.
    pub async fn sweep_at(&self, now: UnixTimestamp) -> Result<usize, StoreError> {
        let expired = self.store.expire_overdue(now).await?;
        let count = expired.len();
        if let Some(notifications) = &self.notifications {
            for payment in expired {
                let id = payment.id.clone();
                if let Err(e) = notifications.send(payment.into()).await {
                    tracing::warn!(payment_id = %id, error = %e, "expiry notification not queued");
                }
            }
        }
        Ok(count)
    }

    /// Sweeps every interval until `shutdown` is cancelled.
    ///
    /// The first sweep fires one interval after start.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval = ?self.interval, "expiry sweeper started");

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            match self.sweep().await {
                Ok(0) => tracing::debug!("no overdue payments"),
                Ok(count) => tracing::info!(count, "expired overdue payments"),
                Err(e) => tracing::warn!(error = %e, "expiry sweep failed"),
            }
        }

        tracing::info!("expiry sweeper stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch;
    use crate::payment::{NewPayment, PaymentRequest, PaymentStatus};
    use crate::store::memory::InMemoryPaymentStore;

    const THIRTY_MINUTES: Duration = Duration::from_secs(30 * 60);

    fn open_at(at: UnixTimestamp) -> PaymentRequest {
        PaymentRequest::open(
            NewPayment {
                payee_address: "PAYEE".into(),
                amount: 1_000_000,
                asset_id: 0,
                callback_target: None,
            },
            THIRTY_MINUTES,
            at,
        )
    }

    #[tokio::test]
    async fn test_unpaid_payment_expires_after_timeout() {
        let store = InMemoryPaymentStore::new();
        let created = UnixTimestamp::from_secs(1_700_000_000);
        let payment = open_at(created);
        store.create_payment(payment.clone()).await.unwrap();
        let sweeper = ExpirySweeper::new(Arc::new(store.clone()));

        let before = created + Duration::from_secs(29 * 60);
        assert_eq!(sweeper.sweep_at(before).await.unwrap(), 0);
        assert_eq!(
            store.get_payment(&payment.id).await.unwrap().status,
            PaymentStatus::Pending
        );

        assert_eq!(sweeper.sweep_at(created + THIRTY_MINUTES).await.unwrap(), 1);
        assert_eq!(
            store.get_payment(&payment.id).await.unwrap().status,
            PaymentStatus::Expired
        );
    }

    #[tokio::test]
    async fn test_expiry_is_silent_by_default() {
        let store = InMemoryPaymentStore::new();
        store
            .create_payment(open_at(UnixTimestamp::from_secs(0)))
            .await
            .unwrap();
        let (tx, mut queue) = dispatch::channel(4);
        let sweeper = ExpirySweeper::new(Arc::new(store));
        drop(tx);

        assert_eq!(sweeper.sweep().await.unwrap(), 1);
        assert!(queue.0.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_opt_in_notifies_expired_payments() {
        let store = InMemoryPaymentStore::new();
        let payment = open_at(UnixTimestamp::from_secs(0));
        store.create_payment(payment.clone()).await.unwrap();
        let (tx, mut queue) = dispatch::channel(4);
        let sweeper = ExpirySweeper::new(Arc::new(store)).notify_via(tx);

        assert_eq!(sweeper.sweep().await.unwrap(), 1);
        let event = queue.0.try_recv().unwrap();
        assert_eq!(event.payment.id, payment.id);
        assert_eq!(event.payment.status, PaymentStatus::Expired);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_sweeps_on_interval() {
        let store = InMemoryPaymentStore::new();
        let payment = open_at(UnixTimestamp::from_secs(0));
        store.create_payment(payment.clone()).await.unwrap();
        let sweeper =
            ExpirySweeper::new(Arc::new(store.clone())).with_interval(Duration::from_secs(60));

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(sweeper.run(shutdown.clone()));

        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(
            store.get_payment(&payment.id).await.unwrap().status,
            PaymentStatus::Pending
        );

        time::sleep(Duration::from_secs(31)).await;
        assert_eq!(
            store.get_payment(&payment.id).await.unwrap().status,
            PaymentStatus::Expired
        );

        shutdown.cancel();
        task.await.unwrap();
    }
}

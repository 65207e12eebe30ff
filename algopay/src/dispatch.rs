//! Notification queue and merchant callback delivery.
//!
//! Producers (the reconciler, and the sweeper when expiry notifications are
//! enabled) push [`PaymentEvent`]s through a bounded queue. A single
//! [`NotificationDispatcher`] consumes them: it re-persists the terminal
//! status, then hands the callback to a detached delivery task so network I/O
//! never blocks the queue.
//!
//! Delivery is best-effort. One POST, any 2xx is success, failures are
//! logged and dropped.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{Semaphore, mpsc};
use tokio_util::task::TaskTracker;
use url::Url;

use crate::error::{DeliveryError, QueueClosed, StoreError};
use crate::payment::{PaymentId, PaymentRequest, PaymentStatus};
use crate::store::PaymentStore;
use crate::timestamp::UnixTimestamp;

/// Default number of events the queue holds before producers wait.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Default bound on concurrently running callback deliveries.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 16;

/// A payment that reached a terminal status and may need a callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentEvent {
    /// The payment as persisted after its transition.
    pub payment: PaymentRequest,
}

impl From<PaymentRequest> for PaymentEvent {
    fn from(payment: PaymentRequest) -> Self {
        Self { payment }
    }
}

/// JSON body POSTed to a merchant's callback target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookPayload {
    /// Id of the payment request.
    pub payment_id: PaymentId,
    /// Final status.
    pub status: PaymentStatus,
    /// Address the funds were requested to.
    #[serde(rename = "merchant_address")]
    pub payee_address: String,
    /// Requested amount in the asset's smallest unit.
    pub amount: u64,
    /// `0` for the native asset.
    pub asset_id: u64,
    /// Matched transaction, present for completed payments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub txn_id: Option<String>,
    /// Server time at which the notification was built.
    pub timestamp: UnixTimestamp,
}

impl WebhookPayload {
    /// Describes the final state of `payment` as of `now`.
    #[must_use]
    pub fn from_payment(payment: &PaymentRequest, now: UnixTimestamp) -> Self {
        Self {
            payment_id: payment.id.clone(),
            status: payment.status,
            payee_address: payment.payee_address.clone(),
            amount: payment.amount,
            asset_id: payment.asset_id,
            txn_id: payment.matched_txn_id.clone(),
            timestamp: now,
        }
    }
}

/// Delivers a notification to a merchant endpoint.
///
/// Implementations make exactly one attempt and must bound it with a timeout.
#[async_trait]
pub trait CallbackSender: Send + Sync {
    /// POSTs `payload` to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError`] on transport failure or a non-2xx answer.
    async fn deliver(&self, target: &Url, payload: &WebhookPayload) -> Result<(), DeliveryError>;
}

/// Creates the bounded notification queue.
///
/// # Panics
///
/// Panics if `capacity` is zero.
#[must_use]
pub fn channel(capacity: usize) -> (NotificationSender, NotificationQueue) {
    let (tx, rx) = mpsc::channel(capacity);
    (NotificationSender(tx), NotificationQueue(rx))
}

/// Producer handle of the notification queue.
///
/// The dispatcher stops once every clone has been dropped.
#[derive(Debug, Clone)]
pub struct NotificationSender(mpsc::Sender<PaymentEvent>);

impl NotificationSender {
    /// Queues an event, waiting for free capacity if the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`QueueClosed`] if the dispatcher is no longer running.
    pub async fn send(&self, event: PaymentEvent) -> Result<(), QueueClosed> {
        self.0.send(event).await.map_err(|_| QueueClosed)
    }
}

/// Consumer end of the notification queue, owned by the dispatcher.
#[derive(Debug)]
pub struct NotificationQueue(pub(crate) mpsc::Receiver<PaymentEvent>);

/// Single consumer of the notification queue.
pub struct NotificationDispatcher {
    store: Arc<dyn PaymentStore>,
    callbacks: Arc<dyn CallbackSender>,
    permits: Arc<Semaphore>,
    deliveries: TaskTracker,
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("available_permits", &self.permits.available_permits())
            .field("in_flight", &self.deliveries.len())
            .finish_non_exhaustive()
    }
}

impl NotificationDispatcher {
    /// Creates a dispatcher running at most `max_in_flight` deliveries at once.
    #[must_use]
    pub fn new(
        store: Arc<dyn PaymentStore>,
        callbacks: Arc<dyn CallbackSender>,
        max_in_flight: usize,
    ) -> Self {
        Self {
            store,
            callbacks,
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
            deliveries: TaskTracker::new(),
        }
    }

    /// Consumes events until every [`NotificationSender`] is dropped.
    ///
    /// Events already queued are processed first, then in-flight deliveries
    /// are awaited before returning.
    pub async fn run(self, mut queue: NotificationQueue) {
        tracing::info!("notification dispatcher started");
        while let Some(event) = queue.0.recv().await {
            self.handle(event).await;
        }
        self.deliveries.close();
        tracing::debug!(in_flight = self.deliveries.len(), "waiting for callback deliveries");
        self.deliveries.wait().await;
        tracing::info!("notification dispatcher stopped");
    }

    async fn handle(&self, event: PaymentEvent) {
        let payment = event.payment;
        let id = payment.id.clone();

        let persisted = match self
            .store
            .update_status(
                &id,
                payment.status,
                payment.matched_txn_id.clone(),
                UnixTimestamp::now(),
            )
            .await
        {
            Ok(change) => change.payment,
            Err(e @ (StoreError::Transition { .. } | StoreError::NotFound(_))) => {
                tracing::warn!(payment_id = %id, error = %e, "dropping notification for inconsistent payment");
                return;
            }
            Err(e) => {
                // Producers persist before queueing, so the event is still authoritative.
                tracing::warn!(payment_id = %id, error = %e, "failed to re-persist terminal status");
                payment
            }
        };

        let Some(target) = persisted.callback_target.clone() else {
            tracing::debug!(payment_id = %id, "no callback target configured");
            return;
        };

        // The semaphore is owned by the dispatcher and never closed.
        let Ok(permit) = Arc::clone(&self.permits).acquire_owned().await else {
            return;
        };
        let payload = WebhookPayload::from_payment(&persisted, UnixTimestamp::now());
        let callbacks = Arc::clone(&self.callbacks);

        self.deliveries.spawn(async move {
            let _permit = permit;
            match callbacks.deliver(&target, &payload).await {
                Ok(()) => tracing::info!(
                    payment_id = %payload.payment_id,
                    status = %payload.status,
                    target = %target,
                    "callback delivered"
                ),
                Err(e) => tracing::warn!(
                    payment_id = %payload.payment_id,
                    target = %target,
                    error = %e,
                    "callback delivery failed"
                ),
            }
        });
    }
}

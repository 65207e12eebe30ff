//! Lifecycle of the reconciliation engine.
//!
//! [`Engine::spawn`] wires the notification queue between the producers and
//! the dispatcher and starts the three tasks on one [`TaskTracker`].
//! Shutdown is driven by a [`CancellationToken`]:
//!
//! 1. the reconciler and the sweeper finish their current tick and return,
//!    dropping their queue handles;
//! 2. the dispatcher drains what is left in the queue;
//! 3. the dispatcher waits for in-flight callback deliveries.
//!
//! [`EngineHandle::wait`] resolves after step 3.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::dispatch::{self, CallbackSender, NotificationDispatcher};
use crate::dispatch::{DEFAULT_MAX_IN_FLIGHT, DEFAULT_QUEUE_CAPACITY};
use crate::ledger::LedgerQuery;
use crate::reconcile::{DEFAULT_RECONCILE_INTERVAL, Reconciler, Watermark};
use crate::store::PaymentStore;
use crate::sweeper::{DEFAULT_EXPIRY_INTERVAL, ExpirySweeper};

/// Tuning of the engine's tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Time between reconciliation ticks.
    pub reconcile_interval: Duration,
    /// Time between expiry sweeps.
    pub expiry_interval: Duration,
    /// Capacity of the notification queue.
    pub queue_capacity: usize,
    /// Maximum concurrent callback deliveries.
    pub max_in_flight: usize,
    /// Notify merchants of expired payments too.
    pub notify_on_expiry: bool,
    /// Height the reconciler starts scanning above.
    pub start_height: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reconcile_interval: DEFAULT_RECONCILE_INTERVAL,
            expiry_interval: DEFAULT_EXPIRY_INTERVAL,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
            notify_on_expiry: false,
            start_height: 0,
        }
    }
}

/// The reconciler, sweeper and notification dispatcher, ready to start.
pub struct Engine {
    store: Arc<dyn PaymentStore>,
    ledger: Arc<dyn LedgerQuery>,
    callbacks: Arc<dyn CallbackSender>,
    config: EngineConfig,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Assembles an engine over the given ports.
    #[must_use]
    pub fn new(
        store: Arc<dyn PaymentStore>,
        ledger: Arc<dyn LedgerQuery>,
        callbacks: Arc<dyn CallbackSender>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            callbacks,
            config,
        }
    }

    /// Starts all three tasks on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if `queue_capacity` is zero.
    #[must_use]
    pub fn spawn(self, shutdown: CancellationToken) -> EngineHandle {
        let config = self.config;
        let (notifications, queue) = dispatch::channel(config.queue_capacity);

        let dispatcher = NotificationDispatcher::new(
            Arc::clone(&self.store),
            self.callbacks,
            config.max_in_flight,
        );
        let reconciler = Reconciler::new(
            Arc::clone(&self.store),
            self.ledger,
            notifications.clone(),
        )
        .with_interval(config.reconcile_interval)
        .with_watermark(Watermark::new(config.start_height));
        let mut sweeper = ExpirySweeper::new(self.store).with_interval(config.expiry_interval);
        if config.notify_on_expiry {
            sweeper = sweeper.notify_via(notifications);
        }

        let tracker = TaskTracker::new();
        tracker.spawn(dispatcher.run(queue));
        tracker.spawn(reconciler.run(shutdown.clone()));
        tracker.spawn(sweeper.run(shutdown));
        tracker.close();

        tracing::info!(
            reconcile_interval = ?config.reconcile_interval,
            expiry_interval = ?config.expiry_interval,
            queue_capacity = config.queue_capacity,
            max_in_flight = config.max_in_flight,
            notify_on_expiry = config.notify_on_expiry,
            "engine started"
        );
        EngineHandle { tracker }
    }
}

/// Handle on the running engine tasks.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    tracker: TaskTracker,
}

impl EngineHandle {
    /// Resolves once every engine task has returned.
    pub async fn wait(&self) {
        self.tracker.wait().await;
    }

    /// Returns `true` once every engine task has returned.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.tracker.is_empty()
    }
}

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core of the algopay payment gateway.
//!
//! A merchant opens a [`PaymentRequest`](payment::PaymentRequest) for an
//! on-chain transfer. This crate watches the ledger until a qualifying
//! transaction appears, moves the request to its terminal state exactly once,
//! and notifies the merchant's backend. It is ledger-agnostic: chain access,
//! persistence and callback delivery are reached through ports implemented by
//! separate crates.
//!
//! # Overview
//!
//! Three long-running tasks make up the engine:
//!
//! - the [`Reconciler`](reconcile::Reconciler) scans new ledger heights for
//!   transactions matching active payments and completes them,
//! - the [`NotificationDispatcher`](dispatch::NotificationDispatcher) consumes
//!   completed transitions and fires merchant callbacks,
//! - the [`ExpirySweeper`](sweeper::ExpirySweeper) expires requests nobody paid.
//!
//! [`Engine`](engine::Engine) starts all three and shuts them down gracefully.
//!
//! # Modules
//!
//! - [`payment`] - Payment requests and their state machine
//! - [`timestamp`] - Unix timestamps used for creation and expiry
//! - [`store`] - Persistence port and bundled store implementations
//! - [`ledger`] - Read-only ledger port and matched transactions
//! - [`matcher`] - First-match selection of qualifying transactions
//! - [`reconcile`] - The reconciliation loop and its height watermark
//! - [`dispatch`] - Notification queue, consumer and callback seam
//! - [`sweeper`] - Periodic expiry of overdue requests
//! - [`engine`] - Task lifecycle for the three loops
//! - [`service`] - Merchant-facing create/lookup operations
//! - [`error`] - Error types shared across the crate
//!
//! # Feature Flags
//!
//! - `storage-rocksdb` - Enables the persistent [`RocksDbPaymentStore`](store::rocksdb::RocksDbPaymentStore)

pub mod dispatch;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod matcher;
pub mod payment;
pub mod reconcile;
pub mod service;
pub mod store;
pub mod sweeper;
pub mod timestamp;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{Engine, EngineConfig, EngineHandle};
pub use payment::{NewPayment, PaymentId, PaymentRequest, PaymentStatus};
pub use timestamp::UnixTimestamp;

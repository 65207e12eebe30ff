//! Algorand ledger access for algopay.
//!
//! [`AlgorandClient`] implements [`algopay::ledger::LedgerQuery`] over the
//! algod REST API (latest round) and the indexer REST API (account
//! transactions). Native ALGO payments are `pay` transactions; asset
//! payments are `axfer` transactions filtered by asset id.
//!
//! # Modules
//!
//! - [`client`] - The HTTP client and its [`LedgerQuery`](algopay::ledger::LedgerQuery) implementation
//! - [`types`] - Wire types of the algod and indexer responses
//! - [`address`] - Syntactic checks on Algorand addresses
//! - [`error`] - Client error type

pub mod address;
pub mod client;
pub mod error;
pub mod types;

pub use client::AlgorandClient;
pub use error::AlgorandClientError;

//! algopay HTTP server.
//!
//! Wires the payment engine, the Algorand client, the RocksDB store and the
//! REST API into one process.
//!
//! # Modules
//!
//! - [`config`] - TOML configuration with environment overrides
//! - [`shutdown`] - Signal handling for graceful shutdown

pub mod config;
pub mod shutdown;

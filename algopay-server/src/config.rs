//! Server configuration.
//!
//! Loads configuration from a TOML file with support for environment variable
//! expansion in string values. Variables use `$VAR` or `${VAR}` syntax.
//!
//! # Example Configuration
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 8080
//! payment_timeout_minutes = 30
//!
//! [storage]
//! backend = "rocksdb"
//! path = "./algopay.db"
//!
//! [algorand]
//! node_url = "https://testnet-api.algonode.cloud"
//! indexer_url = "https://testnet-idx.algonode.cloud"
//! token = "$ALGO_TOKEN"
//!
//! [engine]
//! reconcile_interval_secs = 10
//! expiry_interval_secs = 300
//! notify_on_expiry = false
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` - Path to configuration file (default: `config.toml`)
//! - `HOST` / `PORT` - Override the bind address
//! - `DATABASE_PATH` - Override `storage.path`
//! - `ALGO_NODE_URL` / `ALGO_INDEXER_URL` / `ALGO_TOKEN` - Override `[algorand]`
//! - `PAYMENT_TIMEOUT` - Override `payment_timeout_minutes`

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use algopay::EngineConfig;
use serde::{Deserialize, Serialize};

/// Bounds for outbound HTTP timeouts, in seconds.
const HTTP_TIMEOUT_RANGE: std::ops::RangeInclusive<u64> = 1..=30;

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// File that was read.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The configuration file is not valid TOML for [`ServerConfig`].
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    /// An environment override could not be parsed.
    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv {
        /// The environment variable.
        var: &'static str,
        /// Its raw value.
        value: String,
    },
    /// A value is out of its allowed range.
    #[error("invalid configuration: {field} {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

/// Top-level server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (default: `0.0.0.0`).
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Server port (default: `8080`).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Lifetime of a payment request in minutes (default: `30`).
    #[serde(default = "default_payment_timeout_minutes")]
    pub payment_timeout_minutes: u64,

    /// Where payments are persisted.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Algorand node and indexer endpoints.
    #[serde(default)]
    pub algorand: AlgorandConfig,

    /// Reconciliation engine tuning.
    #[serde(default)]
    pub engine: EngineSection,

    /// Merchant callback delivery.
    #[serde(default)]
    pub webhook: WebhookConfig,
}

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Process-local map, lost on restart.
    Memory,
    /// RocksDB database at [`StorageConfig::path`].
    #[default]
    Rocksdb,
}

/// `[storage]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend to use (default: `rocksdb`).
    #[serde(default)]
    pub backend: StorageBackend,
    /// Database directory (default: `./algopay.db`).
    #[serde(default = "default_database_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: default_database_path(),
        }
    }
}

/// `[algorand]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgorandConfig {
    /// algod base URL.
    #[serde(default = "default_node_url")]
    pub node_url: String,
    /// Indexer base URL.
    #[serde(default = "default_indexer_url")]
    pub indexer_url: String,
    /// API token; empty means none.
    #[serde(default)]
    pub token: String,
    /// Per-request timeout in seconds (default: `10`).
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
    /// Indexer pages followed per lookup (default: `10`).
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
}

impl Default for AlgorandConfig {
    fn default() -> Self {
        Self {
            node_url: default_node_url(),
            indexer_url: default_indexer_url(),
            token: String::new(),
            timeout_secs: default_http_timeout_secs(),
            max_pages: default_max_pages(),
        }
    }
}

/// `[engine]` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// Seconds between reconciliation ticks.
    pub reconcile_interval_secs: u64,
    /// Seconds between expiry sweeps.
    pub expiry_interval_secs: u64,
    /// Notification queue capacity.
    pub queue_capacity: usize,
    /// Maximum concurrent callback deliveries.
    pub max_in_flight: usize,
    /// Also notify merchants of expired payments.
    pub notify_on_expiry: bool,
    /// Ledger height the reconciler starts scanning above.
    pub start_height: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        let defaults = EngineConfig::default();
        Self {
            reconcile_interval_secs: defaults.reconcile_interval.as_secs(),
            expiry_interval_secs: defaults.expiry_interval.as_secs(),
            queue_capacity: defaults.queue_capacity,
            max_in_flight: defaults.max_in_flight,
            notify_on_expiry: defaults.notify_on_expiry,
            start_height: defaults.start_height,
        }
    }
}

/// `[webhook]` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Per-delivery timeout in seconds (default: `10`).
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout_secs(),
        }
    }
}

const fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

const fn default_port() -> u16 {
    8080
}

const fn default_payment_timeout_minutes() -> u64 {
    30
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./algopay.db")
}

fn default_node_url() -> String {
    "https://testnet-api.algonode.cloud".to_owned()
}

fn default_indexer_url() -> String {
    "https://testnet-idx.algonode.cloud".to_owned()
}

const fn default_http_timeout_secs() -> u64 {
    10
}

const fn default_max_pages() -> usize {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            payment_timeout_minutes: default_payment_timeout_minutes(),
            storage: StorageConfig::default(),
            algorand: AlgorandConfig::default(),
            engine: EngineSection::default(),
            webhook: WebhookConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a specific file path, then applies
    /// environment overrides.
    ///
    /// A missing file yields the defaults. `$VAR` / `${VAR}` references in
    /// the file are expanded from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed, or an
    /// override does not parse.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = if path.exists() {
            std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_owned(),
                source,
            })?
        } else {
            tracing::debug!(path = %path.display(), "no configuration file, using defaults");
            String::new()
        };
        let lookup = |name: &str| std::env::var(name).ok();
        let mut config = Self::parse(&content, lookup)?;
        config.apply_env(lookup)?;
        Ok(config)
    }

    /// Parses TOML after expanding variables through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for invalid TOML.
    pub fn parse(content: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(toml::from_str(&expand_env_vars(content, lookup))?)
    }

    /// Applies the deployment environment overrides read through `lookup`.
    ///
    /// Empty values are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidEnv`] if `HOST`, `PORT` or
    /// `PAYMENT_TIMEOUT` does not parse.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let get = |var: &str| lookup(var).filter(|v| !v.is_empty());
        let invalid = |var: &'static str, value: String| ConfigError::InvalidEnv { var, value };

        if let Some(host) = get("HOST") {
            self.host = host.parse().map_err(|_| invalid("HOST", host))?;
        }
        if let Some(port) = get("PORT") {
            self.port = port.parse().map_err(|_| invalid("PORT", port))?;
        }
        if let Some(minutes) = get("PAYMENT_TIMEOUT") {
            self.payment_timeout_minutes =
                minutes.parse().map_err(|_| invalid("PAYMENT_TIMEOUT", minutes))?;
        }
        if let Some(path) = get("DATABASE_PATH") {
            self.storage.path = PathBuf::from(path);
        }
        if let Some(url) = get("ALGO_NODE_URL") {
            self.algorand.node_url = url;
        }
        if let Some(url) = get("ALGO_INDEXER_URL") {
            self.algorand.indexer_url = url;
        }
        if let Some(token) = get("ALGO_TOKEN") {
            self.algorand.token = token;
        }
        Ok(())
    }

    /// Rejects values the engine or the HTTP clients cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason| Err(ConfigError::Invalid { field, reason });
        if self.payment_timeout_minutes == 0 {
            return invalid("payment_timeout_minutes", "must be greater than 0");
        }
        if self.engine.reconcile_interval_secs == 0 {
            return invalid("engine.reconcile_interval_secs", "must be greater than 0");
        }
        if self.engine.expiry_interval_secs == 0 {
            return invalid("engine.expiry_interval_secs", "must be greater than 0");
        }
        if self.engine.queue_capacity == 0 {
            return invalid("engine.queue_capacity", "must be greater than 0");
        }
        if self.engine.max_in_flight == 0 {
            return invalid("engine.max_in_flight", "must be greater than 0");
        }
        if self.algorand.max_pages == 0 {
            return invalid("algorand.max_pages", "must be greater than 0");
        }
        if !HTTP_TIMEOUT_RANGE.contains(&self.algorand.timeout_secs) {
            return invalid("algorand.timeout_secs", "must be between 1 and 30");
        }
        if !HTTP_TIMEOUT_RANGE.contains(&self.webhook.timeout_secs) {
            return invalid("webhook.timeout_secs", "must be between 1 and 30");
        }
        Ok(())
    }

    /// Socket address to bind the API server to.
    #[must_use]
    pub const fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Lifetime of new payment requests.
    #[must_use]
    pub const fn payment_timeout(&self) -> Duration {
        Duration::from_secs(self.payment_timeout_minutes.saturating_mul(60))
    }

    /// Engine settings derived from the `[engine]` section.
    #[must_use]
    pub const fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            reconcile_interval: Duration::from_secs(self.engine.reconcile_interval_secs),
            expiry_interval: Duration::from_secs(self.engine.expiry_interval_secs),
            queue_capacity: self.engine.queue_capacity,
            max_in_flight: self.engine.max_in_flight,
            notify_on_expiry: self.engine.notify_on_expiry,
            start_height: self.engine.start_height,
        }
    }
}

/// Expands `$VAR` and `${VAR}` patterns in a string through `lookup`.
///
/// Unresolved variables are left as-is.
fn expand_env_vars(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            result.push(ch);
            continue;
        }
        let braced = chars.next_if_eq(&'{').is_some();

        let mut name = String::new();
        let mut closed = false;
        while let Some(&c) = chars.peek() {
            if braced && c == '}' {
                chars.next();
                closed = true;
                break;
            }
            if !braced && !c.is_ascii_alphanumeric() && c != '_' {
                break;
            }
            name.push(c);
            chars.next();
        }

        match (name.is_empty(), lookup(&name)) {
            (false, Some(value)) => result.push_str(&value),
            _ => {
                result.push('$');
                if braced {
                    result.push('{');
                }
                result.push_str(&name);
                if closed {
                    result.push('}');
                }
            }
        }
    }

    result
}

//! algopay payment gateway HTTP server.
//!
//! # Usage
//!
//! ```bash
//! # Run with default config (config.toml in current directory)
//! cargo run -p algopay-server --release
//!
//! # Run with a custom config path and env file
//! algopay-server --config /etc/algopay.toml --env-file /etc/algopay.env
//!
//! # Configure logging level
//! RUST_LOG=algopay=debug algopay-server
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` - Path to TOML configuration file (default: `config.toml`)
//! - `HOST` / `PORT` - Override the bind address (default: `0.0.0.0:8080`)
//! - `DATABASE_PATH` - Override the RocksDB directory
//! - `ALGO_NODE_URL` / `ALGO_INDEXER_URL` / `ALGO_TOKEN` - Algorand endpoints
//! - `PAYMENT_TIMEOUT` - Payment lifetime in minutes (default: `30`)
//! - `RUST_LOG` - Log level filter (default: `info`)

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use algopay::Engine;
use algopay::ledger::LedgerQuery;
use algopay::service::PaymentService;
use algopay::store::PaymentStore;
use algopay::store::memory::InMemoryPaymentStore;
use algopay_algorand::AlgorandClient;
use algopay_http::{WebhookClient, api_router};
use axum::http::Method;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tower_http::cors;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use url::Url;

use algopay_server::config::{ServerConfig, StorageBackend, StorageConfig};
use algopay_server::shutdown::ShutdownSignal;

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, env = "CONFIG", default_value = "config.toml")]
    config: PathBuf,

    /// Extra dotenv file loaded before the configuration.
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Port to listen on, overriding the configuration.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    // A missing .env is fine; values may come from the real environment.
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run(Cli::parse()).await {
        tracing::error!("algopay failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(path) = &cli.env_file {
        dotenvy::from_path(path)?;
    }

    let mut config = ServerConfig::load_from(&cli.config)?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    config.validate()?;
    tracing::info!(
        addr = %config.bind_addr(),
        storage = ?config.storage.backend,
        node = %config.algorand.node_url,
        indexer = %config.algorand.indexer_url,
        payment_timeout_minutes = config.payment_timeout_minutes,
        "Loaded configuration"
    );

    let store = open_store(&config.storage)?;
    let ledger: Arc<dyn LedgerQuery> = Arc::new(
        AlgorandClient::try_new(
            Url::parse(&config.algorand.node_url)?,
            Url::parse(&config.algorand.indexer_url)?,
        )?
        .with_token(config.algorand.token.clone())
        .with_timeout(Duration::from_secs(config.algorand.timeout_secs))
        .with_max_pages(config.algorand.max_pages),
    );
    let callbacks = Arc::new(
        WebhookClient::new().with_timeout(Duration::from_secs(config.webhook.timeout_secs)),
    );

    let shutdown = CancellationToken::new();
    let signal = ShutdownSignal::listen(shutdown.clone())?;

    let engine = Engine::new(
        Arc::clone(&store),
        Arc::clone(&ledger),
        callbacks,
        config.engine_config(),
    )
    .spawn(shutdown.clone());

    let service = PaymentService::new(store, ledger).with_timeout(config.payment_timeout());
    let app = api_router(Arc::new(service))
        .layer(TraceLayer::new_for_http())
        .layer(
            cors::CorsLayer::new()
                .allow_origin(cors::Any)
                .allow_methods([Method::GET, Method::POST])
                .allow_headers(cors::Any),
        );

    let served = serve(app, &config, shutdown.clone()).await;

    // Stop the engine even when the server failed on its own.
    shutdown.cancel();
    engine.wait().await;
    signal.wait().await;
    served?;

    tracing::info!("algopay shut down gracefully");
    Ok(())
}

async fn serve(
    app: axum::Router,
    config: &ServerConfig,
    shutdown: CancellationToken,
) -> Result<(), std::io::Error> {
    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("algopay listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
}

fn open_store(storage: &StorageConfig) -> Result<Arc<dyn PaymentStore>, Box<dyn std::error::Error>> {
    match storage.backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage, payments are lost on restart");
            Ok(Arc::new(InMemoryPaymentStore::new()))
        }
        #[cfg(feature = "storage-rocksdb")]
        StorageBackend::Rocksdb => {
            let store = algopay::store::rocksdb::RocksDbPaymentStore::open(&storage.path)?;
            tracing::info!(path = %storage.path.display(), "Opened RocksDB store");
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        StorageBackend::Rocksdb => {
            Err("rocksdb storage requested but the storage-rocksdb feature is disabled".into())
        }
    }
}

//! # murmur-node
//!
//! Long-running node process: opens the local database and blob store,
//! selects the key manager, and drains the event log on an interval until
//! interrupted.

use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use murmur_node::{
    build_key_manager, ingest_ledger, ChannelCodec, EventDrainer, FsBlobStore, MemoryLedger,
    NodeConfig,
};
use murmur_shared::constants::APP_NAME;
use murmur_store::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,murmur_node=debug")),
        )
        .init();

    info!("Starting {} node v{}", APP_NAME, env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = NodeConfig::from_env();
    info!(?config, "Loaded configuration");

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let db = match &config.database_path {
        Some(path) => Database::open_at(path)?,
        None => Database::new()?,
    };
    info!(path = ?db.path(), "Database opened");
    let db = db.into_shared();

    let keys = build_key_manager(&config.key_manager, &db)?;
    let blobs = Arc::new(
        FsBlobStore::new(config.blob_storage_path.clone(), config.max_blob_size).await?,
    );
    let ledger = Arc::new(MemoryLedger::new());

    let codec = Arc::new(ChannelCodec::new(db.clone(), keys, blobs, ledger.clone()));
    let drainer = EventDrainer::new(db.clone(), codec);

    // -----------------------------------------------------------------------
    // 4. Drain the event log until shutdown
    // -----------------------------------------------------------------------
    let mut interval = tokio::time::interval(config.drain_interval);
    let mut cursor = 0usize;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match ingest_ledger(&ledger, &db, cursor).await {
                    Ok(next) => cursor = next,
                    Err(e) => tracing::error!(error = %e, "ledger ingestion failed"),
                }
                if let Err(e) = drainer.drain().await {
                    tracing::error!(error = %e, "event drain failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    Ok(())
}

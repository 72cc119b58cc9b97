//! segkv Server Binary
//!
//! Serves a store directory over HTTP.

use std::sync::Arc;

use clap::Parser;
use segkv::config::{SyncStrategy, DEFAULT_SEGMENT_SIZE};
use segkv::network::HttpServer;
use segkv::{Config, Engine};
use tracing_subscriber::{fmt, EnvFilter};

/// segkv Server
#[derive(Parser, Debug)]
#[command(name = "segkv-server")]
#[command(about = "Segmented key-value store with an HTTP interface")]
#[command(version)]
struct Args {
    /// Database directory
    #[arg(short, long, default_value = "./segkv_data")]
    dir: String,

    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:18080")]
    listen: String,

    /// Active segment size in bytes before rotation
    #[arg(short, long, default_value_t = DEFAULT_SEGMENT_SIZE)]
    segment_size: u64,

    /// fsync after every write
    #[arg(long)]
    sync_every_write: bool,
}

#[tokio::main]
async fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,segkv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("segkv Server v{}", segkv::VERSION);
    tracing::info!("Database directory: {}", args.dir);
    tracing::info!("Listen address: {}", args.listen);

    let sync_strategy = if args.sync_every_write {
        SyncStrategy::EveryWrite
    } else {
        SyncStrategy::Never
    };

    // Build config from args
    let config = Config::builder()
        .data_dir(&args.dir)
        .listen_addr(&args.listen)
        .segment_size(args.segment_size)
        .sync_strategy(sync_strategy)
        .build();

    // Open engine
    let engine = match Engine::open(config.clone()) {
        Ok(e) => Arc::new(e),
        Err(e) => {
            tracing::error!("Database initialization failed: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!(segments = engine.segment_count(), "Engine initialized successfully");

    let server = HttpServer::new(&config, Arc::clone(&engine));
    let served = server.run(shutdown_signal()).await;

    if let Err(e) = engine.close() {
        tracing::error!("Failed to close store: {}", e);
    }

    if let Err(e) = served {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}

/// Resolve on Ctrl+C
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Received Ctrl+C, initiating shutdown...");
}

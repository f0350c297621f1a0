use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use lloggs::LoggingArgs;
use tracing::info;

use pindrop::{Config, FileRegistry, FsStorage, api, config, keepalive, sweep};

#[derive(Parser)]
#[command(name = "pindrop")]
#[command(about = "PIN-gated file relay server")]
struct Args {
    /// Address to listen on
    #[arg(long, short, default_value = "127.0.0.1:3000")]
    listen: SocketAddr,

    /// Storage directory path
    #[arg(long, short)]
    storage: PathBuf,

    /// Externally reachable base URL; enables the keep-alive self-ping
    #[arg(long)]
    public_url: Option<String>,

    /// Maximum upload size in bytes
    #[arg(long, default_value_t = config::DEFAULT_MAX_UPLOAD_BYTES)]
    max_upload_bytes: u64,

    /// Seconds a file stays available after upload
    #[arg(long, default_value_t = config::DEFAULT_TTL_SECONDS)]
    ttl_seconds: u64,

    /// Seconds between expiry sweeps
    #[arg(long, default_value_t = config::DEFAULT_SWEEP_SECONDS)]
    sweep_seconds: u64,

    /// Seconds between keep-alive pings
    #[arg(long, default_value_t = config::DEFAULT_KEEPALIVE_SECONDS)]
    keepalive_seconds: u64,

    #[command(flatten)]
    logging: LoggingArgs,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();
    let _guard = args.logging.setup(|v| match v {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    })?;

    let config = Config {
        listen_addr: args.listen,
        storage_path: args.storage,
        public_url: args.public_url,
        max_upload_bytes: args.max_upload_bytes,
        ttl: Duration::from_secs(args.ttl_seconds),
        sweep_interval: Duration::from_secs(args.sweep_seconds),
        keepalive_interval: Duration::from_secs(args.keepalive_seconds),
    };

    info!(listen = %config.listen_addr, storage = ?config.storage_path, "Starting server");

    // Initialize blob storage
    let storage = FsStorage::new(&config.storage_path);
    storage.init().await?;
    let storage = Arc::new(storage);

    // The registry is the single owner of the catalog; TTL is fixed at
    // construction so every record gets the same lifetime.
    let registry = Arc::new(FileRegistry::new(config.ttl));

    // Background tasks: expiry sweep, and the self-ping when configured.
    tokio::spawn(sweep::run(
        Arc::clone(&registry),
        Arc::clone(&storage),
        config.sweep_interval,
    ));
    if let Some(url) = config.public_url.clone() {
        tokio::spawn(keepalive::run(url, config.keepalive_interval));
    }

    // Build router
    let app = api::router(registry, storage, &config);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!("Listening on {}", config.listen_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

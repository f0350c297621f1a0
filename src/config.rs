use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 500 * 1024 * 1024;
pub const DEFAULT_TTL_SECONDS: u64 = 600;
pub const DEFAULT_SWEEP_SECONDS: u64 = 60;
pub const DEFAULT_KEEPALIVE_SECONDS: u64 = 300;

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub storage_path: PathBuf,
    /// Externally reachable base URL; the keep-alive ping is disabled when unset.
    pub public_url: Option<String>,
    pub max_upload_bytes: u64,
    pub ttl: Duration,
    pub sweep_interval: Duration,
    pub keepalive_interval: Duration,
}

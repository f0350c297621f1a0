//! Keep-alive self-ping.
//!
//! Free-tier hosts idle out processes that receive no traffic; when a
//! public base URL is configured, this task pings our own health endpoint
//! on an interval. Failures are logged and have no other effect.

use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

pub async fn run(base_url: String, interval: Duration) {
    let client = reqwest::Client::new();
    let target = format!("{}/healthz", base_url.trim_end_matches('/'));

    let mut timer = tokio::time::interval(interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    timer.tick().await;

    loop {
        timer.tick().await;
        match client.get(&target).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!(target = %target, "keep-alive ping ok");
            }
            Ok(resp) => {
                warn!(target = %target, status = %resp.status(), "keep-alive ping rejected");
            }
            Err(e) => {
                warn!(target = %target, error = %e, "keep-alive ping failed");
            }
        }
    }
}

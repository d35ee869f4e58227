//! Per-client sliding-window rate limiter.
//!
//! Each identity keeps the instants of its admitted requests inside the
//! trailing window. State is sharded in a `DashMap`, so clients do not
//! contend with each other, and the sweeper prunes through the same shard
//! locks a concurrent `check` takes. Process-local and best-effort: an
//! abuse brake, not an access control.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Rate limiter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests admitted per identity per window.
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Sliding window length in seconds; also the retry-after hint.
    #[serde(default = "default_window")]
    pub window_secs: u64,

    /// Interval between sweeps of expired identities, in seconds.
    #[serde(default = "default_sweep")]
    pub sweep_interval_secs: u64,
}

fn default_max_requests() -> u32 {
    20
}
fn default_window() -> u64 {
    60
}
fn default_sweep() -> u64 {
    60
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window(),
            sweep_interval_secs: default_sweep(),
        }
    }
}

/// Rejection with the hint to send back as `retryAfter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimited {
    pub retry_after: Duration,
}

#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    windows: DashMap<String, Vec<Instant>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            windows: DashMap::new(),
        }
    }

    fn window(&self) -> Duration {
        Duration::from_secs(self.config.window_secs)
    }

    /// Admit and record a request for `identity`, or reject it.
    pub fn check(&self, identity: &str) -> Result<(), RateLimited> {
        let now = Instant::now();
        let window = self.window();

        let mut timestamps = self.windows.entry(identity.to_string()).or_default();
        timestamps.retain(|t| now.duration_since(*t) < window);

        if timestamps.len() >= self.config.max_requests as usize {
            warn!("Rate limit: {} ({} requests)", identity, timestamps.len());
            return Err(RateLimited {
                retry_after: window,
            });
        }

        timestamps.push(now);
        Ok(())
    }

    /// Drop identities with no request inside the window. Returns how many.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let window = self.window();
        let before = self.windows.len();

        self.windows.retain(|_, timestamps| {
            timestamps.retain(|t| now.duration_since(*t) < window);
            !timestamps.is_empty()
        });

        let removed = before.saturating_sub(self.windows.len());
        if removed > 0 {
            debug!("Rate limiter sweep removed {} identities", removed);
        }
        removed
    }

    pub fn tracked_identities(&self) -> usize {
        self.windows.len()
    }

    /// Run `sweep` on the configured interval until the task is aborted.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        let period = Duration::from_secs(limiter.config.sweep_interval_secs.max(1));

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick fires immediately; nothing to sweep yet.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                limiter.sweep();
            }
        })
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

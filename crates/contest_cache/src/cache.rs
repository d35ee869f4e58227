//! In-memory contest cache with stale-while-revalidate fallback.
//!
//! At most one upstream fetch runs at a time. Callers that miss the fresh
//! window while a refresh is pending await the same shared future and
//! observe the same outcome. The pending marker is held for a short grace
//! period after settling so a burst arriving just afterwards does not
//! trigger a second fetch.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::{ContestRecord, Error};
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

use crate::source::ContestSource;

type RefreshResult = Result<Arc<CacheEntry>, Arc<Error>>;
type SharedRefresh = Shared<BoxFuture<'static, RefreshResult>>;

/// Cache windows (all values in seconds).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachePolicy {
    /// Entries younger than this are served without revalidation.
    #[serde(default = "default_fresh")]
    pub fresh_secs: u64,

    /// Entries younger than this are served when a refresh fails.
    #[serde(default = "default_stale")]
    pub stale_secs: u64,

    /// How long a settled refresh keeps absorbing new callers.
    #[serde(default = "default_grace")]
    pub settle_grace_secs: u64,
}

fn default_fresh() -> u64 {
    20 * 60
}
fn default_stale() -> u64 {
    24 * 60 * 60
}
fn default_grace() -> u64 {
    5
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            fresh_secs: default_fresh(),
            stale_secs: default_stale(),
            settle_grace_secs: default_grace(),
        }
    }
}

impl CachePolicy {
    pub fn fresh_window(&self) -> Duration {
        Duration::from_secs(self.fresh_secs)
    }

    pub fn stale_window(&self) -> Duration {
        Duration::from_secs(self.stale_secs)
    }

    pub fn settle_grace(&self) -> Duration {
        Duration::from_secs(self.settle_grace_secs)
    }
}

/// One successful upstream snapshot. Replaced whole, never mutated.
#[derive(Debug)]
pub struct CacheEntry {
    pub contests: Arc<Vec<ContestRecord>>,
    pub captured_at: Instant,
    pub captured_wall: DateTime<Utc>,
}

impl CacheEntry {
    fn new(contests: Vec<ContestRecord>) -> Self {
        Self {
            contests: Arc::new(contests),
            captured_at: Instant::now(),
            captured_wall: Utc::now(),
        }
    }

    pub fn age(&self) -> Duration {
        self.captured_at.elapsed()
    }
}

/// Result of a cache lookup.
#[derive(Debug, Clone)]
pub enum CacheOutcome {
    /// Served from memory inside the fresh window.
    Hit { entry: Arc<CacheEntry>, age: Duration },
    /// Served from a refresh that just completed.
    Refreshed { entry: Arc<CacheEntry> },
    /// Refresh failed; serving an older entry still inside the stale window.
    Stale {
        entry: Arc<CacheEntry>,
        age: Duration,
        reason: String,
    },
    /// Refresh failed and nothing usable is cached.
    Unavailable { reason: String },
}

impl CacheOutcome {
    pub fn contests(&self) -> &[ContestRecord] {
        match self {
            CacheOutcome::Hit { entry, .. }
            | CacheOutcome::Refreshed { entry }
            | CacheOutcome::Stale { entry, .. } => entry.contests.as_slice(),
            CacheOutcome::Unavailable { .. } => &[],
        }
    }
}

/// Process-wide contest cache. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct ServerCache {
    source: Arc<dyn ContestSource>,
    policy: CachePolicy,
    current: Arc<RwLock<Option<Arc<CacheEntry>>>>,
    in_flight: Arc<Mutex<Option<SharedRefresh>>>,
    upstream_fetches: Arc<AtomicU64>,
}

impl ServerCache {
    pub fn new(source: Arc<dyn ContestSource>, policy: CachePolicy) -> Self {
        Self {
            source,
            policy,
            current: Arc::new(RwLock::new(None)),
            in_flight: Arc::new(Mutex::new(None)),
            upstream_fetches: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// Snapshot of the current entry, if any.
    pub fn current(&self) -> Option<Arc<CacheEntry>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of upstream fetches started since construction.
    pub fn upstream_fetches(&self) -> u64 {
        self.upstream_fetches.load(Ordering::Relaxed)
    }

    pub async fn get_contests(&self) -> CacheOutcome {
        match self.current() {
            Some(entry) => {
                let age = entry.age();
                if age < self.policy.fresh_window() {
                    debug!("Cache hit ({}s old)", age.as_secs());
                    return CacheOutcome::Hit { entry, age };
                }
                debug!("Cache expired ({}s old), refreshing", age.as_secs());
            }
            None => debug!("Cache empty, refreshing"),
        }

        match self.refresh().await {
            Ok(entry) => CacheOutcome::Refreshed { entry },
            Err(err) => self.fallback(&err),
        }
    }

    fn fallback(&self, err: &Error) -> CacheOutcome {
        let reason = err.to_string();

        match self.current() {
            Some(entry) if entry.age() < self.policy.stale_window() => {
                let age = entry.age();
                warn!("Serving stale cache ({}s old): {}", age.as_secs(), reason);
                CacheOutcome::Stale { entry, age, reason }
            }
            _ => {
                error!("No usable cache: {}", reason);
                CacheOutcome::Unavailable { reason }
            }
        }
    }

    /// Join the pending refresh, or start one.
    fn refresh(&self) -> SharedRefresh {
        let mut slot = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pending) = slot.as_ref() {
            debug!("Joining in-flight refresh");
            return pending.clone();
        }

        let source = Arc::clone(&self.source);
        let current = Arc::clone(&self.current);
        let fetches = Arc::clone(&self.upstream_fetches);

        let refresh = async move {
            fetches.fetch_add(1, Ordering::Relaxed);
            info!("Fetching contests from upstream");

            match source.fetch().await {
                Ok(contests) => {
                    let entry = Arc::new(CacheEntry::new(contests));
                    *current.write().unwrap_or_else(PoisonError::into_inner) =
                        Some(Arc::clone(&entry));
                    info!("Cached {} contests", entry.contests.len());
                    Ok(entry)
                }
                Err(e) => {
                    warn!("Upstream refresh failed: {}", e);
                    Err(Arc::new(e))
                }
            }
        }
        .boxed()
        .shared();

        *slot = Some(refresh.clone());
        drop(slot);

        // The driver finishes the fetch even if every caller goes away,
        // then releases the marker once the grace period is over.
        let driver = refresh.clone();
        let in_flight = Arc::clone(&self.in_flight);
        let grace = self.policy.settle_grace();
        tokio::spawn(async move {
            let _ = driver.await;
            sleep(grace).await;
            in_flight.lock().unwrap_or_else(PoisonError::into_inner).take();
            debug!("Refresh marker cleared");
        });

        refresh
    }
}

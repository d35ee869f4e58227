//! Refresh cycle: local-cache short circuit, backend fetch, bounded retry,
//! and fallback to the persisted snapshot.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::{ContestMapper, ContestRecord, Error};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::backend::ContestBackend;
use crate::store::{CacheStore, ClientCacheRecord};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Extra attempts after a failed fetch before falling back.
    pub max_retries: u32,
    pub delay: Duration,
    /// Local snapshots younger than this satisfy a non-forced refresh.
    pub cache_max_age: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay: Duration::from_secs(5),
            cache_max_age: Duration::from_secs(20 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshState {
    #[default]
    Idle,
    Fetching,
    Retrying {
        attempt: u32,
    },
    Success,
    Exhausted,
}

/// Owns the refresh cycle. Held by a single task, so cycles never overlap.
pub struct RefreshOrchestrator<B, S> {
    backend: B,
    store: Arc<S>,
    mapper: ContestMapper,
    policy: RetryPolicy,
    retries: u32,
    state: RefreshState,
}

impl<B: ContestBackend, S: CacheStore> RefreshOrchestrator<B, S> {
    pub fn new(backend: B, store: S, mapper: ContestMapper, policy: RetryPolicy) -> Self {
        Self {
            backend,
            store: Arc::new(store),
            mapper,
            policy,
            retries: 0,
            state: RefreshState::Idle,
        }
    }

    pub fn state(&self) -> RefreshState {
        self.state
    }

    /// Retries consumed since the last success or forced refresh.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// A store handle that stays usable while a refresh holds `self`.
    pub fn shared_store(&self) -> Arc<S> {
        Arc::clone(&self.store)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn mapper(&self) -> &ContestMapper {
        &self.mapper
    }

    /// Run one refresh cycle and return the contests to show.
    ///
    /// The retry counter survives across cycles: once exhausted, later
    /// non-forced cycles fall back after a single failed attempt until a
    /// fetch succeeds or a forced refresh resets it.
    pub async fn refresh(&mut self, force: bool) -> Vec<ContestRecord> {
        if force {
            self.retries = 0;
        } else {
            let cached = self.store.read().await;
            let max_age_ms = self.policy.cache_max_age.as_millis() as i64;
            if !cached.contests.is_empty() && cached.age_ms(Utc::now()) < max_age_ms {
                debug!("Local cache is fresh ({} contests)", cached.contests.len());
                return cached.contests;
            }
        }

        loop {
            self.state = RefreshState::Fetching;
            match self.fetch_and_persist().await {
                Ok(contests) => {
                    self.retries = 0;
                    self.state = RefreshState::Success;
                    return contests;
                }
                Err(e) if e.is_retryable() && self.retries < self.policy.max_retries => {
                    self.retries += 1;
                    self.state = RefreshState::Retrying {
                        attempt: self.retries,
                    };
                    warn!(
                        "Refresh failed: {}. Retry {}/{} in {:?}",
                        e, self.retries, self.policy.max_retries, self.policy.delay
                    );
                    sleep(self.policy.delay).await;
                }
                Err(e) => {
                    self.state = RefreshState::Exhausted;
                    warn!("Refresh failed: {}. Using local cache", e);
                    return self.store.read().await.contests;
                }
            }
        }
    }

    async fn fetch_and_persist(&self) -> Result<Vec<ContestRecord>, Error> {
        let response = self.backend.fetch().await?;
        if response.stale {
            info!("Backend served stale data");
        }

        let now = Utc::now();
        let contests = self.mapper.map_at(&response.contests, now);

        let record = ClientCacheRecord {
            contests: contests.clone(),
            timestamp: now.timestamp_millis(),
            last_updated: response.last_updated,
        };
        if let Err(e) = self.store.write(record).await {
            warn!("Failed to persist contests: {}", e);
        }

        info!("Refreshed {} contests", contests.len());
        Ok(contests)
    }

    /// Stored contests that have not started yet, without touching the network.
    pub async fn cached_snapshot(&self) -> (Vec<ContestRecord>, Option<DateTime<Utc>>) {
        cached_snapshot(self.store.as_ref()).await
    }
}

/// Read `store` and drop contests whose start has passed.
pub async fn cached_snapshot<S: CacheStore + ?Sized>(
    store: &S,
) -> (Vec<ContestRecord>, Option<DateTime<Utc>>) {
    let record = store.read().await;
    let now = Utc::now();
    let contests = record
        .contests
        .into_iter()
        .filter(|c| c.starts_after(now))
        .collect();
    (contests, record.last_updated)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::backend::BackendResponse;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Replays queued results; an empty queue answers with a transport error.
    #[derive(Default)]
    pub(crate) struct ScriptedBackend {
        script: Mutex<VecDeque<Result<BackendResponse, Error>>>,
        pub(crate) calls: AtomicUsize,
    }

    impl ScriptedBackend {
        pub(crate) fn new(script: Vec<Result<BackendResponse, Error>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ContestBackend for ScriptedBackend {
        async fn fetch(&self) -> Result<BackendResponse, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .expect("script lock")
                .pop_front()
                .unwrap_or_else(|| Err(Error::Transport("connection refused".into())))
        }
    }

    pub(crate) fn raw_contest(id: &str, platform: &str, start: DateTime<Utc>) -> Value {
        json!({
            "id": id,
            "name": format!("Contest {id}"),
            "platform": platform,
            "url": format!("https://{platform}/{id}"),
            "start": start.to_rfc3339(),
        })
    }

    pub(crate) fn ok_response(contests: Vec<Value>) -> Result<BackendResponse, Error> {
        Ok(BackendResponse {
            contests,
            last_updated: Some(Utc::now()),
            stale: false,
        })
    }

    fn mapper() -> ContestMapper {
        ContestMapper::default()
    }

    fn stored(age: chrono::Duration) -> ClientCacheRecord {
        let start = Utc::now() + chrono::Duration::days(2);
        ClientCacheRecord {
            contests: mapper().map(&[raw_contest("old", "atcoder.jp", start)]),
            timestamp: (Utc::now() - age).timestamp_millis(),
            last_updated: None,
        }
    }

    #[tokio::test]
    async fn test_fresh_local_cache_skips_network() {
        let store = MemoryStore::with_record(stored(chrono::Duration::minutes(5)));
        let mut orch = RefreshOrchestrator::new(
            ScriptedBackend::default(),
            store,
            mapper(),
            RetryPolicy::default(),
        );

        let contests = orch.refresh(false).await;
        assert_eq!(contests.len(), 1);
        assert_eq!(orch.backend().calls(), 0);
        assert_eq!(orch.state(), RefreshState::Idle);
    }

    #[tokio::test]
    async fn test_forced_refresh_fetches_and_persists() {
        let soon = Utc::now() + chrono::Duration::hours(3);
        let later = Utc::now() + chrono::Duration::hours(9);
        let past = Utc::now() - chrono::Duration::hours(1);
        let backend = ScriptedBackend::new(vec![ok_response(vec![
            raw_contest("b", "codeforces.com", later),
            raw_contest("gone", "codeforces.com", past),
            raw_contest("a", "leetcode.com", soon),
        ])]);
        let store = MemoryStore::with_record(stored(chrono::Duration::minutes(5)));
        let mut orch = RefreshOrchestrator::new(backend, store, mapper(), RetryPolicy::default());

        let contests = orch.refresh(true).await;
        let ids: Vec<&str> = contests.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(orch.backend().calls(), 1);
        assert_eq!(orch.state(), RefreshState::Success);

        let persisted = orch.store().read().await;
        assert_eq!(persisted.contests, contests);
        assert!(persisted.last_updated.is_some());
        assert!(persisted.age_ms(Utc::now()) < 60_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_return_stored_snapshot_unchanged() {
        let snapshot = stored(chrono::Duration::hours(2));
        let store = MemoryStore::with_record(snapshot.clone());
        let mut orch = RefreshOrchestrator::new(
            ScriptedBackend::default(),
            store,
            mapper(),
            RetryPolicy::default(),
        );

        let contests = orch.refresh(false).await;
        assert_eq!(contests, snapshot.contests);
        assert_eq!(orch.backend().calls(), 4);
        assert_eq!(orch.retries(), 3);
        assert_eq!(orch.state(), RefreshState::Exhausted);
        assert_eq!(orch.store().read().await, snapshot);

        // Counter stays exhausted: next cycle makes one attempt and falls back.
        orch.refresh(false).await;
        assert_eq!(orch.backend().calls(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_retry() {
        let start = Utc::now() + chrono::Duration::hours(4);
        let backend = ScriptedBackend::new(vec![
            Err(Error::Timeout(15_000)),
            Err(Error::Upstream { status: 503 }),
            ok_response(vec![raw_contest("x", "codechef.com", start)]),
        ]);
        let mut orch =
            RefreshOrchestrator::new(backend, MemoryStore::new(), mapper(), RetryPolicy::default());

        let contests = orch.refresh(false).await;
        assert_eq!(contests.len(), 1);
        assert_eq!(orch.backend().calls(), 3);
        assert_eq!(orch.retries(), 0);
        assert_eq!(orch.state(), RefreshState::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_forced_refresh_resets_exhausted_counter() {
        let mut orch = RefreshOrchestrator::new(
            ScriptedBackend::default(),
            MemoryStore::new(),
            mapper(),
            RetryPolicy::default(),
        );

        orch.refresh(false).await;
        assert_eq!(orch.backend().calls(), 4);

        orch.refresh(true).await;
        assert_eq!(orch.backend().calls(), 8);
    }

    #[tokio::test]
    async fn test_config_error_is_not_retried() {
        let backend = ScriptedBackend::new(vec![Err(Error::Config("bad url".into()))]);
        let mut orch =
            RefreshOrchestrator::new(backend, MemoryStore::new(), mapper(), RetryPolicy::default());

        assert!(orch.refresh(true).await.is_empty());
        assert_eq!(orch.backend().calls(), 1);
        assert_eq!(orch.state(), RefreshState::Exhausted);
    }

    #[tokio::test]
    async fn test_snapshot_drops_started_contests() {
        let future = Utc::now() + chrono::Duration::hours(1);
        let mut record = stored(chrono::Duration::hours(1));
        let mut started = mapper().map(&[raw_contest("s", "atcoder.jp", future)]);
        started[0].start = Utc::now() - chrono::Duration::minutes(1);
        record.contests.extend(started);
        record.last_updated = Some(Utc::now());

        let orch = RefreshOrchestrator::new(
            ScriptedBackend::default(),
            MemoryStore::with_record(record),
            mapper(),
            RetryPolicy::default(),
        );

        let (contests, last_updated) = orch.cached_snapshot().await;
        assert_eq!(contests.len(), 1);
        assert_eq!(contests[0].id, "old");
        assert!(last_updated.is_some());
        assert_eq!(orch.backend().calls(), 0);
    }
}

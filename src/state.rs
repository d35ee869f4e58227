use std::sync::Arc;

use clist_client::ClistClient;
use common::Error;
use contest_cache::{RateLimiter, ServerCache, UpstreamSource};

use crate::config::ServerConfig;

pub struct AppState {
    pub cache: ServerCache,
    pub limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(cache: ServerCache, limiter: Arc<RateLimiter>) -> Arc<Self> {
        Arc::new(Self { cache, limiter })
    }

    /// Wire the CLIST-backed cache and the limiter from configuration.
    pub fn from_config(config: &ServerConfig) -> Result<Arc<Self>, Error> {
        let client = ClistClient::new(config.clist.clone())?;
        let source = UpstreamSource::new(client, config.time.mapper()?);
        let cache = ServerCache::new(Arc::new(source), config.cache.clone());
        let limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));

        Ok(Self::new(cache, limiter))
    }
}

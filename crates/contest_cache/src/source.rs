//! Where the cache gets its contests from.

use async_trait::async_trait;
use clist_client::ClistClient;
use common::{ContestMapper, ContestRecord, Error};

/// A fetchable, already-mapped contest listing.
#[async_trait]
pub trait ContestSource: Send + Sync + 'static {
    async fn fetch(&self) -> Result<Vec<ContestRecord>, Error>;
}

/// CLIST fetch followed by mapping against the wall clock.
#[derive(Debug, Clone)]
pub struct UpstreamSource {
    client: ClistClient,
    mapper: ContestMapper,
}

impl UpstreamSource {
    pub fn new(client: ClistClient, mapper: ContestMapper) -> Self {
        Self { client, mapper }
    }
}

#[async_trait]
impl ContestSource for UpstreamSource {
    async fn fetch(&self) -> Result<Vec<ContestRecord>, Error> {
        let raw = self.client.fetch_upcoming().await?;
        Ok(self.mapper.map(&raw))
    }
}

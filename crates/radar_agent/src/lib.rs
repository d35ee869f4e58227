//! Client-side contest agent.
//!
//! Keeps a local copy of the contest listing fresh: a periodic alarm and
//! explicit refresh requests both drive a single `RefreshOrchestrator`,
//! which fetches from the contest-radar backend with bounded retry and
//! falls back to the last persisted snapshot.

pub mod backend;
pub mod orchestrator;
pub mod protocol;
pub mod store;
pub mod view;

pub use backend::{BackendResponse, ContestBackend, HttpBackend};
pub use orchestrator::{RefreshOrchestrator, RefreshState, RetryPolicy};
pub use protocol::{run_agent, AgentHandle, AgentRequest, ContestSnapshot};
pub use store::{CacheStore, ClientCacheRecord, FileStore, MemoryStore};
pub use view::{platform_display_name, time_until, TimeWindow, ViewFilter};

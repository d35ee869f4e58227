//! Shared types, time handling, and error definitions for contest-radar.

pub mod error;
pub mod mapper;
pub mod time;
pub mod types;

pub use error::{format_error_chain, Error};
pub use mapper::ContestMapper;
pub use time::{DisplayZone, TimeNormalizer};
pub use types::*;

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, Error>;

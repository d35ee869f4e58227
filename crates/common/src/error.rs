//! Unified error type for contest-radar.

use std::error::Error as StdError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Transport(String),

    #[error("Request timed out after {0}ms")]
    Timeout(u64),

    #[error("Upstream rate limit exceeded")]
    RateLimited,

    #[error("Upstream API error (status={status})")]
    Upstream { status: u16 },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Agent stopped before replying")]
    AgentStopped,

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Configuration errors never succeed on retry.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Error::Config(_))
    }
}

/// Render `err` with its `source()` chain, skipping causes already present
/// in the message, and masking every non-empty entry of `secrets`.
pub fn format_error_chain(err: &dyn StdError, secrets: &[&str]) -> String {
    let mut message = err.to_string();
    let mut source = err.source();

    while let Some(cause) = source {
        let cause_msg = cause.to_string();
        if !cause_msg.is_empty() && !message.contains(&cause_msg) {
            message.push_str(": ");
            message.push_str(&cause_msg);
        }
        source = cause.source();
    }

    for secret in secrets.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        message = message.replace(secret, "***");
    }
    message
}

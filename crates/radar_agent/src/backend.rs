//! HTTP access to the contest-radar backend.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{format_error_chain, Error};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

/// Fields the agent uses from `GET /api/contests`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackendResponse {
    #[serde(default)]
    pub contests: Vec<Value>,
    #[serde(default, rename = "lastUpdated", deserialize_with = "lenient_instant")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stale: bool,
}

/// A malformed `lastUpdated` is dropped rather than failing the response.
fn lenient_instant<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Value>::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(Value::as_str)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc)))
}

#[async_trait]
pub trait ContestBackend: Send + Sync {
    async fn fetch(&self) -> Result<BackendResponse, Error>;
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpBackend {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build backend HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
            timeout,
        })
    }

    fn map_error(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout(self.timeout.as_millis() as u64)
        } else {
            Error::Transport(format_error_chain(&err, &[]))
        }
    }
}

#[async_trait]
impl ContestBackend for HttpBackend {
    async fn fetch(&self) -> Result<BackendResponse, Error> {
        debug!("Fetching from backend {}", self.url);

        let resp = self
            .client
            .get(&self.url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(Error::RateLimited);
        }
        if !status.is_success() {
            return Err(Error::Upstream {
                status: status.as_u16(),
            });
        }

        let body = resp.bytes().await.map_err(|e| self.map_error(e))?;
        serde_json::from_slice(&body).map_err(|e| Error::Parse(format!("backend response: {e}")))
    }
}

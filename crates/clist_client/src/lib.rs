//! CLIST contest API client.
//!
//! Fetches the upcoming-contest listing from `clist.by/api/v2/contest/`
//! and hands back the raw `objects` array for mapping.

use std::time::Duration;

use common::{format_error_chain, Error};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

const DEFAULT_BASE_URL: &str = "https://clist.by";
const CONTEST_PATH: &str = "/api/v2/contest/";
const USER_AGENT: &str = "contest-radar/0.1";

/// Connection settings for the CLIST API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClistConfig {
    /// CLIST account name.
    #[serde(default)]
    pub username: String,

    /// CLIST API key.
    #[serde(default)]
    pub api_key: String,

    /// API origin, without trailing slash.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Max contests per request.
    #[serde(default = "default_limit")]
    pub limit: u32,

    /// Absolute request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}
fn default_limit() -> u32 {
    500
}
fn default_timeout_ms() -> u64 {
    10_000
}

impl Default for ClistConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            api_key: String::new(),
            base_url: default_base_url(),
            limit: default_limit(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl ClistConfig {
    pub fn has_credentials(&self) -> bool {
        !self.username.trim().is_empty() && !self.api_key.trim().is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct ContestListResponse {
    /// Absent and `null` both mean no contests.
    #[serde(default)]
    objects: Option<Vec<Value>>,
}

fn normalize_base_url(raw: &str) -> String {
    raw.trim().trim_end_matches('/').to_string()
}

/// Async client for the CLIST contest endpoint.
#[derive(Debug, Clone)]
pub struct ClistClient {
    client: reqwest::Client,
    config: ClistConfig,
}

impl ClistClient {
    pub fn new(mut config: ClistConfig) -> Result<Self, Error> {
        config.base_url = normalize_base_url(&config.base_url);
        if config.base_url.is_empty() {
            config.base_url = default_base_url();
        }

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .pool_max_idle_per_host(4)
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::Config(format!("failed to build CLIST HTTP client: {e}")))?;

        if config.base_url != DEFAULT_BASE_URL {
            info!("Using CLIST base URL override: {}", config.base_url);
        }

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ClistConfig {
        &self.config
    }

    /// The request URL carries the API key, so it is stripped from the error
    /// and the key is masked in whatever the cause chain still mentions.
    fn map_send_error(&self, err: reqwest::Error) -> Error {
        if err.is_timeout() {
            Error::Timeout(self.config.timeout_ms)
        } else {
            let err = err.without_url();
            Error::Transport(format_error_chain(&err, &[self.config.api_key.as_str()]))
        }
    }

    /// Fetch upcoming contests, ordered by start, as raw JSON objects.
    ///
    /// Fails fast with `Error::Config` when credentials are missing; no
    /// request is sent in that case.
    pub async fn fetch_upcoming(&self) -> Result<Vec<Value>, Error> {
        if !self.config.has_credentials() {
            return Err(Error::Config(
                "CLIST_USERNAME and CLIST_API_KEY must be set".into(),
            ));
        }

        let url = format!("{}{}", self.config.base_url, CONTEST_PATH);
        debug!("Fetching upcoming contests from {}", url);

        let limit = self.config.limit.to_string();
        let resp = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .query(&[
                ("username", self.config.username.as_str()),
                ("api_key", self.config.api_key.as_str()),
                ("upcoming", "true"),
                ("limit", limit.as_str()),
                ("order_by", "start"),
            ])
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = resp.status();
        if status.as_u16() == 429 {
            warn!("CLIST rate limit exceeded");
            return Err(Error::RateLimited);
        }
        if !status.is_success() {
            warn!("CLIST returned status {}", status.as_u16());
            return Err(Error::Upstream {
                status: status.as_u16(),
            });
        }

        let body = resp.bytes().await.map_err(|e| self.map_send_error(e))?;
        let parsed: ContestListResponse = serde_json::from_slice(&body)
            .map_err(|e| Error::Parse(format!("CLIST response body: {e}")))?;

        let objects = parsed.objects.unwrap_or_default();
        info!("Fetched {} contests from CLIST", objects.len());
        Ok(objects)
    }
}

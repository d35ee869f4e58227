//! Configuration loader: merges env vars, .env file, and config.toml.

use std::path::Path;

use chrono::FixedOffset;
use clist_client::ClistConfig;
use common::time::parse_offset;
use common::{ContestMapper, DisplayZone, Error, TimeNormalizer};
use contest_cache::{CachePolicy, RateLimitConfig};
use serde::{Deserialize, Serialize};

/// Top-level server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Upstream aggregator settings.
    #[serde(default)]
    pub clist: ClistConfig,

    /// Cache windows.
    #[serde(default)]
    pub cache: CachePolicy,

    /// Per-client admission control.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Timestamp conventions.
    #[serde(default)]
    pub time: TimeConfig,
}

/// How upstream timestamps are read and rendered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeConfig {
    /// Offset assumed for timestamps without a zone designator.
    #[serde(default = "default_naive_offset")]
    pub naive_offset: String,

    /// `local` or a fixed `±HH:MM` offset for display strings.
    #[serde(default = "default_display_zone")]
    pub display_zone: String,
}

fn default_bind() -> String {
    "0.0.0.0:3000".into()
}
fn default_naive_offset() -> String {
    "+00:00".into()
}
fn default_display_zone() -> String {
    "local".into()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            clist: ClistConfig::default(),
            cache: CachePolicy::default(),
            rate_limit: RateLimitConfig::default(),
            time: TimeConfig::default(),
        }
    }
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            naive_offset: default_naive_offset(),
            display_zone: default_display_zone(),
        }
    }
}

impl TimeConfig {
    pub fn naive_offset(&self) -> Result<FixedOffset, Error> {
        parse_offset(&self.naive_offset)
    }

    pub fn display_zone(&self) -> Result<DisplayZone, Error> {
        self.display_zone.parse()
    }

    pub fn mapper(&self) -> Result<ContestMapper, Error> {
        Ok(ContestMapper::new(TimeNormalizer::new(
            self.naive_offset()?,
            self.display_zone()?,
        )))
    }
}

fn parse_positive_u64(raw: &str, env_name: &str) -> Result<u64, Error> {
    match raw.trim().parse::<u64>() {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(Error::Config(format!("{env_name} must be an integer > 0"))),
    }
}

fn validate_config(config: &ServerConfig) -> Result<(), Error> {
    let mut issues: Vec<String> = Vec::new();

    if config.bind.trim().is_empty() {
        issues.push("bind must not be empty".into());
    }
    if config.clist.limit == 0 {
        issues.push("clist.limit must be > 0".into());
    }
    if config.clist.timeout_ms == 0 {
        issues.push("clist.timeout_ms must be > 0".into());
    }
    if config.cache.fresh_secs == 0 {
        issues.push("cache.fresh_secs must be > 0".into());
    }
    if config.cache.stale_secs < config.cache.fresh_secs {
        issues.push("cache.stale_secs must be >= cache.fresh_secs".into());
    }
    if config.rate_limit.max_requests == 0 {
        issues.push("rate_limit.max_requests must be > 0".into());
    }
    if config.rate_limit.window_secs == 0 {
        issues.push("rate_limit.window_secs must be > 0".into());
    }
    if let Err(e) = config.time.naive_offset() {
        issues.push(format!("time.naive_offset: {e}"));
    }
    if let Err(e) = config.time.display_zone() {
        issues.push(format!("time.display_zone: {e}"));
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "Invalid config:\n - {}",
            issues.join("\n - ")
        )))
    }
}

/// Apply environment overrides on top of file/default values.
fn apply_env<F>(config: &mut ServerConfig, var: F) -> Result<(), Error>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(bind) = var("RADAR_BIND") {
        config.bind = bind;
    }
    if let Some(key) = var("CLIST_API_KEY") {
        config.clist.api_key = key;
    }
    if let Some(user) = var("CLIST_USERNAME") {
        config.clist.username = user;
    }
    if let Some(url) = var("CLIST_BASE_URL") {
        config.clist.base_url = url;
    }
    if let Some(raw) = var("CLIST_TIMEOUT_MS") {
        config.clist.timeout_ms = parse_positive_u64(&raw, "CLIST_TIMEOUT_MS")?;
    }
    if let Some(raw) = var("RADAR_CACHE_FRESH_SECS") {
        config.cache.fresh_secs = parse_positive_u64(&raw, "RADAR_CACHE_FRESH_SECS")?;
    }
    if let Some(raw) = var("RADAR_CACHE_STALE_SECS") {
        config.cache.stale_secs = parse_positive_u64(&raw, "RADAR_CACHE_STALE_SECS")?;
    }
    if let Some(raw) = var("RADAR_RATE_LIMIT_MAX") {
        let parsed = parse_positive_u64(&raw, "RADAR_RATE_LIMIT_MAX")?;
        config.rate_limit.max_requests = u32::try_from(parsed)
            .map_err(|_| Error::Config("RADAR_RATE_LIMIT_MAX is too large".into()))?;
    }
    if let Some(offset) = var("CONTEST_NAIVE_OFFSET") {
        config.time.naive_offset = offset;
    }
    if let Some(zone) = var("CONTEST_DISPLAY_OFFSET") {
        config.time.display_zone = zone;
    }

    Ok(())
}

/// Load server configuration from environment and optional config file.
pub fn load_config() -> Result<ServerConfig, Error> {
    // 1. Load .env file from project root or parent directories.
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    // 2. Start with defaults, then config.toml if present.
    let config_path = std::env::var("RADAR_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let mut config = if Path::new(&config_path).exists() {
        let contents = std::fs::read_to_string(&config_path)
            .map_err(|e| Error::Config(format!("Failed to read {config_path}: {e}")))?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse {config_path}: {e}")))?
    } else {
        ServerConfig::default()
    };

    // 3. Environment variables win.
    apply_env(&mut config, |name| std::env::var(name).ok())?;

    validate_config(&config)?;

    // Missing credentials are not fatal: each refresh reports them and
    // the cache degrades to stale data or 503.
    if !config.clist.has_credentials() {
        tracing::warn!("CLIST_USERNAME / CLIST_API_KEY not set; upstream fetches will fail");
    }

    Ok(config)
}

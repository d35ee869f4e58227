use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{ConnectInfo, State};
use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use contest_cache::CacheOutcome;
use serde_json::json;

use crate::state::AppState;

/// Bucket key for rate limiting: proxy headers first, then the socket peer.
pub fn client_identity(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    let real_ip = || {
        headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    forwarded
        .or_else(real_ip)
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

pub async fn contests_handler(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Response {
    let started = Instant::now();

    let identity = client_identity(&headers, peer.map(|ConnectInfo(addr)| addr));
    if let Err(limited) = state.limiter.check(&identity) {
        let secs = limited.retry_after.as_secs();
        return (
            StatusCode::TOO_MANY_REQUESTS,
            [(RETRY_AFTER, secs.to_string())],
            Json(json!({
                "error": "Too many requests",
                "retryAfter": secs,
            })),
        )
            .into_response();
    }

    let outcome = state.cache.get_contests().await;
    let response_time = started.elapsed().as_millis() as u64;

    match outcome {
        CacheOutcome::Hit { entry, age } => {
            tracing::info!("Cache hit ({}s old) - {}ms", age.as_secs(), response_time);
            Json(json!({
                "contests": entry.contests.as_slice(),
                "cached": true,
                "fresh": true,
                "cacheAge": age.as_secs(),
                "responseTime": response_time,
                "lastUpdated": entry.captured_wall,
            }))
            .into_response()
        }
        CacheOutcome::Refreshed { entry } => Json(json!({
            "contests": entry.contests.as_slice(),
            "cached": false,
            "fresh": true,
            "count": entry.contests.len(),
            "responseTime": response_time,
            "lastUpdated": entry.captured_wall,
        }))
        .into_response(),
        CacheOutcome::Stale { entry, age, .. } => Json(json!({
            "contests": entry.contests.as_slice(),
            "cached": true,
            "stale": true,
            "error": "Failed to fetch fresh data",
            "cacheAge": age.as_secs(),
            "lastUpdated": entry.captured_wall,
        }))
        .into_response(),
        CacheOutcome::Unavailable { .. } => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "error": "Service unavailable",
                "message": "Please try again later",
                "contests": [],
            })),
        )
            .into_response(),
    }
}

pub async fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({ "error": "Method not allowed" })),
    )
        .into_response()
}

pub async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

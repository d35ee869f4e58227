//! Contest listing backend.
//!
//! Serves upcoming programming contests from the CLIST aggregator behind
//! an in-memory cache. One endpoint, `GET /api/contests`, CORS-open.
//!
//! # Responses
//! - fresh from upstream: `{contests, cached: false, fresh: true, count, responseTime, lastUpdated}`
//! - fresh from memory: `{contests, cached: true, fresh: true, cacheAge, responseTime, lastUpdated}`
//! - upstream failing, cache under 24h old: `{contests, cached: true, stale: true, error, cacheAge, lastUpdated}`
//! - nothing usable: `503 {error, message, contests: []}`
//! - over 20 requests/minute from one client: `429 {error, retryAfter: 60}`
//!
//! # Setup
//!
//! ```sh
//! export CLIST_USERNAME=... CLIST_API_KEY=...
//! cargo run --bin contest-radar
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header::CONTENT_TYPE, Method},
    routing::get,
    Router,
};
use tokio::{net::TcpListener, signal::ctrl_c};
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

pub mod config;
pub mod routes;
pub mod state;

use config::ServerConfig;
use routes::{contests_handler, health_handler, method_not_allowed};
use state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    // OPTIONS never reaches the route: the CORS layer answers it.
    let contests = get(contests_handler).fallback(method_not_allowed);

    Router::new()
        .route("/", contests.clone())
        .route("/api/contests", contests)
        .route("/health", get(health_handler))
        .layer(cors)
        .with_state(state)
}

pub async fn start_server(config: ServerConfig) -> Result<(), common::Error> {
    info!("Initializing state...");
    let state = AppState::from_config(&config)?;
    let sweeper = state.limiter.spawn_sweeper();

    let app = router(state);

    info!("Binding to {}", config.bind);
    let listener = TcpListener::bind(&config.bind).await?;
    info!("Server running on {}", config.bind);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    sweeper.abort();
    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::Utc;
    use common::{ContestRecord, Error};
    use contest_cache::{CachePolicy, ContestSource, RateLimitConfig, RateLimiter, ServerCache};
    use http_body_util::BodyExt;
    use serde_json::Value;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tower::ServiceExt;

    #[derive(Default)]
    struct FakeSource {
        failing: AtomicBool,
    }

    #[async_trait]
    impl ContestSource for FakeSource {
        async fn fetch(&self) -> Result<Vec<ContestRecord>, Error> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(Error::Timeout(10_000));
            }
            let start = Utc::now() + chrono::Duration::days(2);
            Ok(vec![ContestRecord {
                id: "42".into(),
                name: "Div. 2 Round".into(),
                platform: "codeforces.com".into(),
                url: "https://codeforces.com/contest/42".into(),
                start,
                end: None,
                start_date: start.format("%d-%m-%Y").to_string(),
                start_time: start.format("%H:%M").to_string(),
                end_time: String::new(),
                start_timestamp: start.timestamp_millis(),
            }])
        }
    }

    fn app(source: Arc<FakeSource>, max_requests: u32) -> Router {
        let cache = ServerCache::new(source, CachePolicy::default());
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig {
            max_requests,
            ..Default::default()
        }));
        router(AppState::new(cache, limiter))
    }

    fn get_from(client: &str) -> Request<Body> {
        Request::builder()
            .uri("/api/contests")
            .header("x-forwarded-for", client)
            .body(Body::empty())
            .expect("request should build")
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body should collect")
            .to_bytes();
        serde_json::from_slice(&bytes).expect("body should be json")
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_then_cache_hit() {
        let app = app(Arc::new(FakeSource::default()), 20);

        let response = app.clone().oneshot(get_from("1.1.1.1")).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["cached"], false);
        assert_eq!(body["fresh"], true);
        assert_eq!(body["count"], 1);
        assert_eq!(body["contests"][0]["name"], "Div. 2 Round");
        assert!(body["lastUpdated"].is_string());

        tokio::time::sleep(std::time::Duration::from_secs(90)).await;
        let body = body_json(app.oneshot(get_from("1.1.1.1")).await.expect("response")).await;
        assert_eq!(body["cached"], true);
        assert_eq!(body["fresh"], true);
        assert_eq!(body["cacheAge"], 90);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_then_unavailable() {
        let source = Arc::new(FakeSource::default());
        let app = app(source.clone(), 20);
        assert_eq!(
            app.clone().oneshot(get_from("a")).await.expect("response").status(),
            StatusCode::OK
        );

        source.failing.store(true, Ordering::SeqCst);
        tokio::time::sleep(std::time::Duration::from_secs(23 * 3600)).await;
        let response = app.clone().oneshot(get_from("a")).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["stale"], true);
        assert_eq!(body["cached"], true);
        assert_eq!(body["error"], "Failed to fetch fresh data");
        assert_eq!(body["contests"].as_array().map(Vec::len), Some(1));

        tokio::time::sleep(std::time::Duration::from_secs(2 * 3600)).await;
        let response = app.oneshot(get_from("a")).await.expect("response");
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Service unavailable");
        assert_eq!(body["contests"], serde_json::json!([]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_returns_429() {
        let app = app(Arc::new(FakeSource::default()), 20);

        for _ in 0..20 {
            let response = app.clone().oneshot(get_from("9.9.9.9")).await.expect("response");
            assert_eq!(response.status(), StatusCode::OK);
        }

        let response = app.clone().oneshot(get_from("9.9.9.9")).await.expect("response");
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get("retry-after").and_then(|v| v.to_str().ok()),
            Some("60")
        );
        let body = body_json(response).await;
        assert_eq!(body["retryAfter"], 60);

        let other = app.oneshot(get_from("8.8.8.8")).await.expect("response");
        assert_eq!(other.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_other_methods_are_rejected() {
        let app = app(Arc::new(FakeSource::default()), 20);
        let request = Request::builder()
            .method("POST")
            .uri("/api/contests")
            .body(Body::empty())
            .expect("request should build");

        let response = app.oneshot(request).await.expect("response");
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body_json(response).await["error"], "Method not allowed");
    }

    #[tokio::test]
    async fn test_options_and_preflight() {
        let app = app(Arc::new(FakeSource::default()), 20);

        let plain = Request::builder()
            .method("OPTIONS")
            .uri("/api/contests")
            .body(Body::empty())
            .expect("request should build");
        let response = app.clone().oneshot(plain).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .and_then(|v| v.to_str().ok()),
            Some("*")
        );
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("body should collect")
            .to_bytes();
        assert!(bytes.is_empty());

        let preflight = Request::builder()
            .method("OPTIONS")
            .uri("/api/contests")
            .header("origin", "chrome-extension://abc")
            .header("access-control-request-method", "GET")
            .body(Body::empty())
            .expect("request should build");
        let response = app.oneshot(preflight).await.expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .and_then(|v| v.to_str().ok()),
            Some("*")
        );
    }
}

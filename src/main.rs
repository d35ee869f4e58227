//! contest-radar: cached CLIST contest listing server.

use clap::Parser;
use tracing::{error, info};

use contest_radar::config;
use contest_radar::state::AppState;
use contest_cache::CacheOutcome;

/// Upcoming programming contest API
#[derive(Parser)]
#[command(name = "contest-radar", about = "Cached upcoming-contest API server")]
struct Cli {
    /// Fetch contests once through the cache, print a summary, and exit.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "contest_radar=info,contest_cache=info,clist_client=info,common=warn".into()
            }),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();

    info!("contest-radar starting up...");

    let cfg = match config::load_config() {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Cache: fresh={}s stale={}s grace={}s",
        cfg.cache.fresh_secs, cfg.cache.stale_secs, cfg.cache.settle_grace_secs
    );
    info!(
        "Rate limit: {} requests / {}s per client",
        cfg.rate_limit.max_requests, cfg.rate_limit.window_secs
    );
    info!(
        "Timestamps: naive={} display={}",
        cfg.time.naive_offset, cfg.time.display_zone
    );

    if cli.dry_run {
        let state = match AppState::from_config(&cfg) {
            Ok(s) => s,
            Err(e) => {
                error!("Initialization failed: {}", e);
                std::process::exit(1);
            }
        };

        match state.cache.get_contests().await {
            CacheOutcome::Unavailable { reason } => {
                error!("Fetch failed: {}", reason);
                std::process::exit(1);
            }
            outcome => {
                for contest in outcome.contests() {
                    info!(
                        "  {} {} [{}] {}",
                        contest.start_date, contest.start_time, contest.platform, contest.name
                    );
                }
                info!("{} upcoming contests", outcome.contests().len());
            }
        }
        return;
    }

    if let Err(e) = contest_radar::start_server(cfg).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}

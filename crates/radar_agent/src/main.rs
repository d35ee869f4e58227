use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use common::time::parse_offset;
use common::{ContestMapper, ContestRecord, DisplayZone, Error, TimeNormalizer};
use radar_agent::protocol::{self, AgentHandle};
use radar_agent::{
    platform_display_name, run_agent, time_until, FileStore, HttpBackend, RefreshOrchestrator,
    RetryPolicy, TimeWindow, ViewFilter,
};
use tracing::{error, info};

/// Upper bound for minute-valued settings (one week).
const MAX_MINUTES: u64 = 7 * 24 * 60;

fn minutes(value: u64) -> Duration {
    Duration::from_secs(value.min(MAX_MINUTES) * 60)
}

#[derive(Debug, Args)]
struct AgentConfig {
    #[arg(
        long,
        env = "RADAR_BACKEND_URL",
        default_value = "http://127.0.0.1:3000/api/contests",
        global = true
    )]
    backend_url: String,

    #[arg(long, env = "RADAR_STORE", default_value = "contest-radar-cache.json", global = true)]
    store: PathBuf,

    /// Alarm period for scheduled refreshes.
    #[arg(long, env = "RADAR_REFRESH_MINUTES", default_value_t = 20, global = true)]
    refresh_minutes: u64,

    #[arg(long, env = "RADAR_CACHE_MAX_AGE_MINUTES", default_value_t = 20, global = true)]
    cache_max_age_minutes: u64,

    #[arg(long, env = "RADAR_MAX_RETRIES", default_value_t = 3, global = true)]
    max_retries: u32,

    #[arg(long, env = "RADAR_RETRY_DELAY_SECS", default_value_t = 5, global = true)]
    retry_delay_secs: u64,

    #[arg(long, env = "RADAR_TIMEOUT_SECS", default_value_t = 15, global = true)]
    timeout_secs: u64,

    /// `local` or a fixed `±HH:MM` offset.
    #[arg(
        long,
        env = "CONTEST_DISPLAY_OFFSET",
        default_value = "local",
        global = true,
        allow_hyphen_values = true
    )]
    display_offset: String,

    /// Offset assumed for timestamps without a zone designator.
    #[arg(
        long,
        env = "CONTEST_NAIVE_OFFSET",
        default_value = "+00:00",
        global = true,
        allow_hyphen_values = true
    )]
    naive_offset: String,
}

impl AgentConfig {
    fn display_zone(&self) -> Result<DisplayZone, Error> {
        self.display_offset.parse()
    }

    fn mapper(&self) -> Result<ContestMapper, Error> {
        Ok(ContestMapper::new(TimeNormalizer::new(
            parse_offset(&self.naive_offset)?,
            self.display_zone()?,
        )))
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            delay: Duration::from_secs(self.retry_delay_secs),
            cache_max_age: minutes(self.cache_max_age_minutes),
        }
    }

    fn validate(&self) -> Result<(), Error> {
        let mut issues: Vec<String> = Vec::new();

        if self.refresh_minutes == 0 || self.refresh_minutes > MAX_MINUTES {
            issues.push(format!("refresh_minutes must be in 1..={MAX_MINUTES}"));
        }
        if self.cache_max_age_minutes > MAX_MINUTES {
            issues.push(format!("cache_max_age_minutes must be <= {MAX_MINUTES}"));
        }
        if self.timeout_secs == 0 {
            issues.push("timeout_secs must be > 0".into());
        }
        if let Err(e) = self.display_zone() {
            issues.push(format!("display_offset: {e}"));
        }
        if let Err(e) = parse_offset(&self.naive_offset) {
            issues.push(format!("naive_offset: {e}"));
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
}

#[derive(Debug, Parser)]
#[command(name = "radar-agent", about = "Local contest cache and listing")]
struct Cli {
    #[command(flatten)]
    config: AgentConfig,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Keep the local cache refreshed on the alarm period until interrupted.
    Run,
    /// Print upcoming contests from the local cache.
    List {
        /// Force a refresh before listing.
        #[arg(long)]
        refresh: bool,

        /// Platform substring; repeatable.
        #[arg(long = "platform")]
        platforms: Vec<String>,

        #[arg(long, default_value = "all")]
        window: TimeWindow,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

fn spawn_agent(config: &AgentConfig, alarm: Option<Duration>) -> Result<AgentHandle, Error> {
    let backend = HttpBackend::new(
        config.backend_url.clone(),
        Duration::from_secs(config.timeout_secs),
    )?;
    let orchestrator = RefreshOrchestrator::new(
        backend,
        FileStore::new(config.store.clone()),
        config.mapper()?,
        config.retry_policy(),
    );

    let (handle, rx) = protocol::channel(16);
    tokio::spawn(run_agent(orchestrator, rx, alarm));
    Ok(handle)
}

fn print_contests(contests: &[ContestRecord], now: DateTime<Utc>) {
    for c in contests {
        let end = if c.end_time.is_empty() {
            String::new()
        } else {
            format!("-{}", c.end_time)
        };
        println!(
            "{} {}{}  ({})  [{}] {}  {}",
            c.start_date,
            c.start_time,
            end,
            time_until(c.start, now),
            platform_display_name(&c.platform),
            c.name,
            c.url
        );
    }
}

async fn run(cli: Cli) -> Result<(), Error> {
    cli.config.validate()?;
    info!(
        "Backend: {} | store: {}",
        cli.config.backend_url,
        cli.config.store.display()
    );

    match cli.command {
        Command::Run => {
            let period = minutes(cli.config.refresh_minutes);
            let _handle = spawn_agent(&cli.config, Some(period))?;
            info!("Refreshing every {} minutes; Ctrl-C to stop", cli.config.refresh_minutes);
            tokio::signal::ctrl_c().await?;
            info!("Shutting down");
        }
        Command::List {
            refresh,
            platforms,
            window,
            limit,
        } => {
            let handle = spawn_agent(&cli.config, None)?;
            if refresh {
                let fetched = handle.refresh_contests().await?;
                info!("Refresh returned {} contests", fetched.len());
            }

            let snapshot = handle.get_contests().await?;
            let filter = ViewFilter {
                platforms,
                window,
                per_platform_limit: limit,
            };
            let now = Utc::now();
            let shown = filter.apply(&snapshot.contests, now, cli.config.display_zone()?);

            print_contests(&shown, now);
            match snapshot.last_updated {
                Some(at) => println!("{} contests (backend updated {})", shown.len(), at),
                None => println!("{} contests", shown.len()),
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "radar_agent=info,common=warn".into()),
        )
        .with_target(true)
        .init();

    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_arguments_parse() {
        let cli = Cli::try_parse_from([
            "radar-agent",
            "--display-offset",
            "+05:30",
            "list",
            "--refresh",
            "--platform",
            "codeforces",
            "--platform",
            "atcoder",
            "--window",
            "week",
        ])
        .expect("arguments should parse");

        assert!(cli.config.validate().is_ok());
        assert!(matches!(cli.config.display_zone(), Ok(DisplayZone::Fixed(_))));
        match cli.command {
            Command::List {
                refresh,
                platforms,
                window,
                limit,
            } => {
                assert!(refresh);
                assert_eq!(platforms, vec!["codeforces", "atcoder"]);
                assert_eq!(window, TimeWindow::Week);
                assert_eq!(limit, 20);
            }
            Command::Run => panic!("expected list"),
        }
    }

    #[test]
    fn test_invalid_offsets_fail_validation() {
        let cli = Cli::try_parse_from([
            "radar-agent",
            "--display-offset",
            "mars",
            "--naive-offset",
            "IST",
            "run",
        ])
        .expect("arguments should parse");

        let msg = cli.config.validate().expect_err("must fail").to_string();
        assert!(msg.contains("display_offset"));
        assert!(msg.contains("naive_offset"));
    }

    #[test]
    fn test_huge_minute_values_are_rejected() {
        let cli = Cli::try_parse_from([
            "radar-agent",
            "--refresh-minutes",
            "18446744073709551615",
            "--cache-max-age-minutes",
            "18446744073709551615",
            "run",
        ])
        .expect("arguments should parse");

        let msg = cli.config.validate().expect_err("must fail").to_string();
        assert!(msg.contains("refresh_minutes"));
        assert!(msg.contains("cache_max_age_minutes"));
        assert_eq!(
            cli.config.retry_policy().cache_max_age,
            Duration::from_secs(MAX_MINUTES * 60)
        );
    }
}

//! Listing filters for presenting contests.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use common::{ContestRecord, DisplayZone, Error};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeWindow {
    #[default]
    All,
    Today,
    Week,
    Month,
}

impl TimeWindow {
    fn days(self) -> Option<i64> {
        match self {
            TimeWindow::All => None,
            TimeWindow::Today => Some(1),
            TimeWindow::Week => Some(7),
            TimeWindow::Month => Some(30),
        }
    }
}

impl FromStr for TimeWindow {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(TimeWindow::All),
            "today" => Ok(TimeWindow::Today),
            "week" => Ok(TimeWindow::Week),
            "month" => Ok(TimeWindow::Month),
            other => Err(Error::Config(format!(
                "unknown time window '{other}' (expected all, today, week or month)"
            ))),
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimeWindow::All => "all",
            TimeWindow::Today => "today",
            TimeWindow::Week => "week",
            TimeWindow::Month => "month",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct ViewFilter {
    /// Case-insensitive substrings; empty keeps every platform.
    pub platforms: Vec<String>,
    pub window: TimeWindow,
    pub per_platform_limit: usize,
}

impl Default for ViewFilter {
    fn default() -> Self {
        Self {
            platforms: Vec::new(),
            window: TimeWindow::All,
            per_platform_limit: 20,
        }
    }
}

impl ViewFilter {
    fn matches_platform(&self, platform: &str) -> bool {
        if self.platforms.is_empty() {
            return true;
        }
        let platform = platform.to_lowercase();
        self.platforms
            .iter()
            .any(|p| platform.contains(&p.to_lowercase()))
    }

    /// Filter an ordered listing. Windows are measured from midnight in `zone`.
    pub fn apply(
        &self,
        contests: &[ContestRecord],
        now: DateTime<Utc>,
        zone: DisplayZone,
    ) -> Vec<ContestRecord> {
        let bounds = self.window.days().map(|days| {
            let from = zone.start_of_day(now);
            (from, from + Duration::days(days))
        });

        let mut per_platform: HashMap<&str, usize> = HashMap::new();
        contests
            .iter()
            .filter(|c| self.matches_platform(&c.platform))
            .filter(|c| bounds.map_or(true, |(from, to)| c.start >= from && c.start < to))
            .filter(|c| {
                let seen = per_platform.entry(c.platform.as_str()).or_insert(0);
                *seen += 1;
                *seen <= self.per_platform_limit
            })
            .cloned()
            .collect()
    }
}

const PLATFORM_NAMES: &[(&str, &str)] = &[
    ("codeforces.com", "Codeforces"),
    ("atcoder.jp", "AtCoder"),
    ("leetcode.com", "LeetCode"),
    ("codechef.com", "CodeChef"),
    ("kaggle.com", "Kaggle"),
    ("topcoder.com", "TopCoder"),
    ("hackerrank.com", "HackerRank"),
    ("hackerearth.com", "HackerEarth"),
];

/// Friendly name for known hosts; anything else is shown as-is.
pub fn platform_display_name(platform: &str) -> &str {
    let lower = platform.to_lowercase();
    PLATFORM_NAMES
        .iter()
        .find(|(host, _)| lower.contains(host))
        .map_or(platform, |&(_, name)| name)
}

/// Countdown label such as `in 2d 5h`, `in 3h 10m` or `in 7m`.
pub fn time_until(start: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = start - now;
    if diff < Duration::zero() {
        return "Started".to_string();
    }

    let days = diff.num_days();
    let hours = diff.num_hours() % 24;
    let minutes = diff.num_minutes() % 60;

    if days > 0 {
        format!("in {days}d {hours}h")
    } else if hours > 0 {
        format!("in {hours}h {minutes}m")
    } else {
        format!("in {minutes}m")
    }
}

//! Timestamp normalization and display rendering.
//!
//! The aggregator emits start/end times without a zone designator. Those
//! naive strings are read in a configured offset (UTC unless overridden);
//! strings carrying `Z` or an explicit offset are taken as-is.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc};

use crate::Error;

const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];
const OFFSET_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%z",
];

/// Zone used when rendering display strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayZone {
    /// The host's local zone.
    #[default]
    Local,
    Fixed(FixedOffset),
}

impl DisplayZone {
    /// Midnight of the day containing `instant`, in this zone.
    pub fn start_of_day(&self, instant: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            DisplayZone::Local => {
                let midnight = instant
                    .with_timezone(&Local)
                    .date_naive()
                    .and_time(NaiveTime::MIN);
                // DST gaps can skip midnight; fall back to the instant itself.
                Local
                    .from_local_datetime(&midnight)
                    .earliest()
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or(instant)
            }
            DisplayZone::Fixed(offset) => {
                let midnight = instant
                    .with_timezone(offset)
                    .date_naive()
                    .and_time(NaiveTime::MIN);
                offset
                    .from_local_datetime(&midnight)
                    .single()
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or(instant)
            }
        }
    }
}

impl FromStr for DisplayZone {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("local") {
            return Ok(DisplayZone::Local);
        }
        parse_offset(s).map(DisplayZone::Fixed)
    }
}

impl fmt::Display for DisplayZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayZone::Local => f.write_str("local"),
            DisplayZone::Fixed(offset) => write!(f, "{offset}"),
        }
    }
}

/// Parse `Z`, `UTC`, `+05:30`, or `-0300` into a fixed offset.
pub fn parse_offset(raw: &str) -> Result<FixedOffset, Error> {
    let s = raw.trim();
    if s.eq_ignore_ascii_case("z") || s.eq_ignore_ascii_case("utc") {
        return Ok(Utc.fix());
    }

    let invalid = || Error::Config(format!("invalid UTC offset '{raw}' (expected ±HH:MM)"));

    let (sign, rest) = match s.as_bytes().first() {
        Some(b'+') => (1, &s[1..]),
        Some(b'-') => (-1, &s[1..]),
        _ => return Err(invalid()),
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    let hours: i32 = digits[..2].parse().map_err(|_| invalid())?;
    let minutes: i32 = digits[2..].parse().map_err(|_| invalid())?;
    if minutes >= 60 {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

/// True when the string ends in `Z` or a `±HH:MM` / `±HHMM` designator.
fn has_zone_designator(s: &str) -> bool {
    if s.ends_with('Z') || s.ends_with('z') {
        return true;
    }

    let bytes = s.as_bytes();
    let signed_at = |idx: usize| matches!(bytes.get(idx), Some(b'+') | Some(b'-'));
    let digits = |range: std::ops::Range<usize>| bytes[range].iter().all(u8::is_ascii_digit);

    let len = bytes.len();
    if len >= 6 && signed_at(len - 6) && bytes[len - 3] == b':' {
        return digits(len - 5..len - 3) && digits(len - 2..len);
    }
    // `T` guard keeps a bare date like `2026-1020` from reading as an offset.
    len >= 5 && signed_at(len - 5) && digits(len - 4..len) && s.contains(['T', ' '])
}

fn parse_naive(s: &str) -> Option<NaiveDateTime> {
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

/// Converts upstream timestamps into instants and renders them for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeNormalizer {
    naive_offset: FixedOffset,
    display: DisplayZone,
}

impl Default for TimeNormalizer {
    fn default() -> Self {
        Self::new(Utc.fix(), DisplayZone::Local)
    }
}

impl TimeNormalizer {
    pub fn new(naive_offset: FixedOffset, display: DisplayZone) -> Self {
        Self {
            naive_offset,
            display,
        }
    }

    pub fn naive_offset(&self) -> FixedOffset {
        self.naive_offset
    }

    pub fn display_zone(&self) -> DisplayZone {
        self.display
    }

    /// Resolve a raw timestamp to an instant, or `None` to drop the record.
    pub fn normalize(&self, raw: &str) -> Option<DateTime<Utc>> {
        let s = raw.trim();
        if s.is_empty() {
            return None;
        }

        if let Some(naive_part) = s.strip_suffix(['Z', 'z']) {
            return parse_naive(naive_part).map(|naive| naive.and_utc());
        }

        if has_zone_designator(s) {
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            return OFFSET_FORMATS
                .iter()
                .find_map(|fmt| DateTime::parse_from_str(s, fmt).ok())
                .map(|dt| dt.with_timezone(&Utc));
        }

        let naive = parse_naive(s)?;
        self.naive_offset
            .from_local_datetime(&naive)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// `DD-MM-YYYY` in the display zone.
    pub fn render_date(&self, instant: DateTime<Utc>) -> String {
        self.render(instant, "%d-%m-%Y")
    }

    /// `HH:MM` (24h) in the display zone.
    pub fn render_time(&self, instant: DateTime<Utc>) -> String {
        self.render(instant, "%H:%M")
    }

    fn render(&self, instant: DateTime<Utc>, fmt: &str) -> String {
        match self.display {
            DisplayZone::Local => instant.with_timezone(&Local).format(fmt).to_string(),
            DisplayZone::Fixed(offset) => instant.with_timezone(&offset).format(fmt).to_string(),
        }
    }
}

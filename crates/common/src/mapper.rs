//! Maps raw aggregator objects into sorted, future-only `ContestRecord`s.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::time::TimeNormalizer;
use crate::types::{ContestRecord, RawContest};

#[derive(Debug, Clone, Copy, Default)]
pub struct ContestMapper {
    normalizer: TimeNormalizer,
}

impl ContestMapper {
    pub fn new(normalizer: TimeNormalizer) -> Self {
        Self { normalizer }
    }

    pub fn normalizer(&self) -> &TimeNormalizer {
        &self.normalizer
    }

    /// Map a batch against the current wall clock.
    pub fn map(&self, raw: &[Value]) -> Vec<ContestRecord> {
        self.map_at(raw, Utc::now())
    }

    /// Map a batch, keeping only contests starting strictly after `now`.
    ///
    /// A malformed record is logged and skipped; it never aborts the batch.
    pub fn map_at(&self, raw: &[Value], now: DateTime<Utc>) -> Vec<ContestRecord> {
        let mut contests: Vec<ContestRecord> = raw
            .iter()
            .filter_map(|value| self.map_one(value))
            .filter(|contest| contest.starts_after(now))
            .collect();

        contests.sort_by_key(|contest| contest.start);

        debug!("Mapped {} of {} raw contests", contests.len(), raw.len());
        contests
    }

    fn map_one(&self, value: &Value) -> Option<ContestRecord> {
        let raw = match RawContest::deserialize(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Skipping malformed contest record: {}", e);
                return None;
            }
        };

        let Some(start) = raw.start.as_deref().and_then(|s| self.normalizer.normalize(s)) else {
            warn!(
                "Invalid start time for '{}': {:?}",
                raw.event,
                raw.start.as_deref().unwrap_or("")
            );
            return None;
        };

        // An unparseable end is tolerated and treated as unknown.
        let end = raw.end.as_deref().and_then(|s| self.normalizer.normalize(s));

        Some(ContestRecord {
            id: raw.id,
            name: raw.event,
            platform: raw.resource,
            url: raw.href,
            start,
            end,
            start_date: self.normalizer.render_date(start),
            start_time: self.normalizer.render_time(start),
            end_time: end
                .map(|e| self.normalizer.render_time(e))
                .unwrap_or_default(),
            start_timestamp: start.timestamp_millis(),
        })
    }
}

//! Contest data types shared by the server and the agent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// ── Upstream wire types ───────────────────────────────────────────────

/// One raw contest object as returned by the aggregator's `objects` array.
///
/// Every field is lenient: a missing `start` is detected later by the mapper,
/// not by deserialization. The `name`/`platform`/`url` aliases let the agent
/// run the server's already-mapped records back through the same mapper.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawContest {
    #[serde(default, deserialize_with = "id_from_any")]
    pub id: String,
    #[serde(default, alias = "name")]
    pub event: String,
    #[serde(default, alias = "platform")]
    pub resource: String,
    #[serde(default, alias = "url")]
    pub href: String,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
}

/// Upstream ids are integers, mapped records carry strings; accept both.
fn id_from_any<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

// ── Mapped types ──────────────────────────────────────────────────────

/// A normalized, display-ready contest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContestRecord {
    pub id: String,
    pub name: String,
    /// Upstream host identifier, e.g. `codeforces.com`.
    pub platform: String,
    pub url: String,
    /// Absolute start instant.
    pub start: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    /// `DD-MM-YYYY` in the display zone.
    pub start_date: String,
    /// `HH:MM` in the display zone.
    pub start_time: String,
    /// `HH:MM` in the display zone, empty when the end is unknown.
    #[serde(default)]
    pub end_time: String,
    /// Start as epoch milliseconds.
    pub start_timestamp: i64,
}

impl ContestRecord {
    pub fn starts_after(&self, instant: DateTime<Utc>) -> bool {
        self.start > instant
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_contest_accepts_numeric_id() {
        let raw: RawContest = serde_json::from_str(
            r#"{"id": 51234, "event": "Round 1", "resource": "codeforces.com",
                "href": "https://codeforces.com/contests/1", "start": "2026-10-20T14:35:00"}"#,
        )
        .expect("raw contest should deserialize");

        assert_eq!(raw.id, "51234");
        assert_eq!(raw.resource, "codeforces.com");
        assert!(raw.end.is_none());
    }

    #[test]
    fn test_raw_contest_accepts_mapped_record_keys() {
        let raw: RawContest = serde_json::from_str(
            r#"{"id": "7", "name": "ABC 400", "platform": "atcoder.jp",
                "url": "https://atcoder.jp/contests/abc400", "start": "2026-10-20T12:00:00Z",
                "startDate": "20-10-2026", "startTime": "12:00", "endTime": "",
                "startTimestamp": 1792497600000}"#,
        )
        .expect("mapped record should deserialize as raw");

        assert_eq!(raw.event, "ABC 400");
        assert_eq!(raw.href, "https://atcoder.jp/contests/abc400");
        assert_eq!(raw.start.as_deref(), Some("2026-10-20T12:00:00Z"));
    }

    #[test]
    fn test_contest_record_serializes_camel_case() {
        let start = DateTime::parse_from_rfc3339("2026-10-20T12:00:00Z")
            .expect("valid start")
            .with_timezone(&Utc);
        let record = ContestRecord {
            id: "1".into(),
            name: "Weekly".into(),
            platform: "leetcode.com".into(),
            url: "https://leetcode.com/contest".into(),
            start,
            end: None,
            start_date: "20-10-2026".into(),
            start_time: "12:00".into(),
            end_time: String::new(),
            start_timestamp: start.timestamp_millis(),
        };

        let json = serde_json::to_value(&record).expect("record should serialize");
        assert_eq!(json["startDate"], "20-10-2026");
        assert_eq!(json["start"], "2026-10-20T12:00:00Z");
        assert!(json.get("end").is_none());
    }
}

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub type Timestamp = chrono::DateTime<chrono::Utc>;

pub fn now() -> Timestamp {
    chrono::Utc::now()
}

/// Source of the current time, injected wherever "now" matters for a decision.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;

    fn now_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        now()
    }
}

/// A clock that only moves when told to. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    millis: Arc<AtomicI64>,
}

impl ManualClock {
    pub fn new(at: Timestamp) -> Self {
        Self {
            millis: Arc::new(AtomicI64::new(at.timestamp_millis())),
        }
    }

    pub fn set(&self, at: Timestamp) {
        self.millis.store(at.timestamp_millis(), Ordering::SeqCst);
    }

    pub fn advance(&self, by: chrono::Duration) {
        self.millis
            .fetch_add(by.num_milliseconds(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        let millis = self.millis.load(Ordering::SeqCst);
        chrono::DateTime::<chrono::Utc>::from_timestamp_millis(millis).unwrap_or_default()
    }
}

/// Format a number of seconds as `M:SS`, or `H:MM:SS` once it reaches an hour.
///
/// Negative input is clamped to `0:00`.
pub fn format_seconds(seconds: i64) -> String {
    let seconds = seconds.max(0);

    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let seconds = seconds % 60;

    if hours > 0 {
        format!("{hours}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes}:{seconds:02}")
    }
}

pub fn format_optional_seconds(seconds: Option<i64>) -> String {
    format_seconds(seconds.unwrap_or_default())
}

const DAY_UNITS: &[(char, u64)] = &[('D', 86_400)];
const TIME_UNITS: &[(char, u64)] = &[('H', 3600), ('M', 60), ('S', 1)];

/// Parse an ISO-8601 duration such as `PT1H2M3S` into seconds.
///
/// Every component is optional and missing components count as zero. YouTube emits a day
/// component for very long videos (`P1DT2H`) so that is accepted as well. Anything that does
/// not contain at least one component yields `0`.
pub fn parse_iso8601_duration(text: &str) -> u64 {
    let Some(rest) = text.trim().strip_prefix('P') else {
        return 0;
    };

    let (days, time) = match rest.split_once('T') {
        Some((days, time)) => (days, time),
        None => (rest, ""),
    };

    let mut total = 0u64;
    let mut found = false;

    for (part, units) in [(days, DAY_UNITS), (time, TIME_UNITS)] {
        let mut number = String::new();

        for c in part.chars() {
            if c.is_ascii_digit() {
                number.push(c);
                continue;
            }

            let Some((_, scale)) = units.iter().find(|(unit, _)| *unit == c) else {
                return 0;
            };
            let Ok(value) = number.parse::<u64>() else {
                return 0;
            };

            total = total.saturating_add(value.saturating_mul(*scale));
            found = true;
            number.clear();
        }

        // trailing digits without a unit designator
        if !number.is_empty() {
            return 0;
        }
    }

    if found {
        total
    } else {
        0
    }
}

/// Encode seconds back into the `PT#H#M#S` form, omitting zero components.
pub fn encode_iso8601_duration(seconds: u64) -> String {
    if seconds == 0 {
        return "PT0S".to_string();
    }

    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let seconds = seconds % 60;

    let mut encoded = String::from("PT");
    if hours > 0 {
        encoded.push_str(&format!("{hours}H"));
    }
    if minutes > 0 {
        encoded.push_str(&format!("{minutes}M"));
    }
    if seconds > 0 {
        encoded.push_str(&format!("{seconds}S"));
    }
    encoded
}

/// A duration as it shows up in stored documents: either already in seconds or still encoded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DurationValue {
    Seconds(f64),
    Text(String),
}

impl DurationValue {
    pub fn seconds(&self) -> u64 {
        match self {
            DurationValue::Seconds(seconds) if seconds.is_finite() && *seconds > 0.0 => {
                seconds.floor() as u64
            }
            DurationValue::Seconds(_) => 0,
            DurationValue::Text(text) if text.trim_start().starts_with('P') => {
                parse_iso8601_duration(text)
            }
            DurationValue::Text(text) => text
                .trim()
                .parse::<f64>()
                .map(|seconds| DurationValue::Seconds(seconds).seconds())
                .unwrap_or_default(),
        }
    }
}

pub fn seconds_from_duration_value(value: &serde_json::Value) -> u64 {
    match value {
        serde_json::Value::Number(number) => number
            .as_f64()
            .map(|seconds| DurationValue::Seconds(seconds).seconds())
            .unwrap_or_default(),
        serde_json::Value::String(text) => DurationValue::Text(text.clone()).seconds(),
        _ => 0,
    }
}

/// Video length kept both in its encoded form and as canonical seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoDuration {
    pub encoded: String,
    pub seconds: u64,
}

impl VideoDuration {
    pub fn from_encoded(encoded: impl Into<String>) -> Self {
        let encoded = encoded.into();
        let seconds = parse_iso8601_duration(&encoded);
        Self { encoded, seconds }
    }

    pub fn from_seconds(seconds: u64) -> Self {
        Self {
            encoded: encode_iso8601_duration(seconds),
            seconds,
        }
    }

    pub fn zero() -> Self {
        Self::from_seconds(0)
    }

    pub fn display(&self) -> String {
        format_seconds(self.seconds as i64)
    }
}

impl Default for VideoDuration {
    fn default() -> Self {
        Self::zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_under_an_hour() {
        assert_eq!(format_seconds(0), "0:00");
        assert_eq!(format_seconds(5), "0:05");
        assert_eq!(format_seconds(65), "1:05");
        assert_eq!(format_seconds(3599), "59:59");
    }

    #[test]
    fn format_an_hour_or_more() {
        assert_eq!(format_seconds(3600), "1:00:00");
        assert_eq!(format_seconds(3725), "1:02:05");
        assert_eq!(format_seconds(36_000 + 61), "10:01:01");
    }

    #[test]
    fn format_negative_and_missing() {
        assert_eq!(format_seconds(-30), "0:00");
        assert_eq!(format_optional_seconds(None), "0:00");
        assert_eq!(format_optional_seconds(Some(90)), "1:30");
    }

    #[test]
    fn parse_single_components() {
        assert_eq!(parse_iso8601_duration("PT2H"), 7200);
        assert_eq!(parse_iso8601_duration("PT15M"), 900);
        assert_eq!(parse_iso8601_duration("PT42S"), 42);
    }

    #[test]
    fn parse_combined_components() {
        assert_eq!(parse_iso8601_duration("PT1H2M3S"), 3723);
        assert_eq!(parse_iso8601_duration("PT1H3S"), 3603);
        assert_eq!(parse_iso8601_duration("PT10M30S"), 630);
        assert_eq!(parse_iso8601_duration("P1DT2H"), 93_600);
    }

    #[test]
    fn parse_malformed_input() {
        assert_eq!(parse_iso8601_duration(""), 0);
        assert_eq!(parse_iso8601_duration("PT"), 0);
        assert_eq!(parse_iso8601_duration("P"), 0);
        assert_eq!(parse_iso8601_duration("1H2M"), 0);
        assert_eq!(parse_iso8601_duration("PT12"), 0);
        assert_eq!(parse_iso8601_duration("PT1X"), 0);
        assert_eq!(parse_iso8601_duration("not a duration"), 0);
    }

    #[test]
    fn encoded_durations_parse_back() {
        for h in 0..=5 {
            for m in 0..60 {
                for s in 0..60 {
                    let expected = h * 3600 + m * 60 + s;
                    if expected == 0 {
                        continue;
                    }

                    let encoded = encode_iso8601_duration(expected);
                    assert_eq!(parse_iso8601_duration(&encoded), expected, "{encoded}");
                }
            }
        }
    }

    #[test]
    fn duration_value_normalization() {
        assert_eq!(seconds_from_duration_value(&serde_json::json!("PT4M13S")), 253);
        assert_eq!(seconds_from_duration_value(&serde_json::json!(253)), 253);
        assert_eq!(seconds_from_duration_value(&serde_json::json!(12.9)), 12);
        assert_eq!(seconds_from_duration_value(&serde_json::json!("75")), 75);
        assert_eq!(seconds_from_duration_value(&serde_json::json!("abc")), 0);
        assert_eq!(seconds_from_duration_value(&serde_json::json!(-4)), 0);
        assert_eq!(seconds_from_duration_value(&serde_json::json!(null)), 0);
        assert_eq!(seconds_from_duration_value(&serde_json::json!({ "s": 1 })), 0);
    }

    #[test]
    fn duration_value_deserializes_both_forms() {
        let values: Vec<DurationValue> = serde_json::from_str(r#"["PT1M", 60]"#).unwrap();
        assert!(values.iter().all(|value| value.seconds() == 60));
    }

    #[test]
    fn video_duration_forms_agree() {
        let duration = VideoDuration::from_encoded("PT1H1S");
        assert_eq!(duration.seconds, 3601);
        assert_eq!(duration.display(), "1:00:01");
        assert_eq!(VideoDuration::from_seconds(3601).encoded, "PT1H1S");
        assert_eq!(VideoDuration::zero().display(), "0:00");
    }
}

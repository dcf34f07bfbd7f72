// Timestamp normalization at the system boundary
use super::error::{TelemetryError, TelemetryResult};
use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeDelta, Utc};
use serde_json::Value;

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Every timestamp representation the service accepts from its collaborators.
///
/// Naive values are taken to be UTC, which is what the database server
/// stores. Anything outside this set is rejected when it enters the system.
#[derive(Debug, Clone, PartialEq)]
pub enum RawTimestamp {
    Utc(DateTime<Utc>),
    Offset(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
    EpochMillis(f64),
    Text(String),
}

impl RawTimestamp {
    /// Convert to the canonical UTC type used everywhere past the boundary
    pub fn normalize(&self) -> TelemetryResult<DateTime<Utc>> {
        match self {
            RawTimestamp::Utc(t) => Ok(*t),
            RawTimestamp::Offset(t) => Ok(t.with_timezone(&Utc)),
            RawTimestamp::Naive(t) => Ok(t.and_utc()),
            RawTimestamp::EpochMillis(ms) => from_epoch_millis(*ms),
            RawTimestamp::Text(s) => parse_text(s),
        }
    }

    /// Accept the JSON shapes InfluxDB hands back: RFC 3339 strings, or
    /// epoch milliseconds when the query asks for `epoch=ms`.
    pub fn from_json(value: &Value) -> TelemetryResult<Self> {
        match value {
            Value::String(s) => Ok(RawTimestamp::Text(s.clone())),
            Value::Number(n) => match n.as_f64() {
                Some(ms) => Ok(RawTimestamp::EpochMillis(ms)),
                None => Err(format_error(n, "number is not representable")),
            },
            other => Err(format_error(other, "expected a string or a number")),
        }
    }
}

impl From<DateTime<Utc>> for RawTimestamp {
    fn from(t: DateTime<Utc>) -> Self {
        RawTimestamp::Utc(t)
    }
}

fn from_epoch_millis(ms: f64) -> TelemetryResult<DateTime<Utc>> {
    if !ms.is_finite() {
        return Err(format_error(ms, "epoch milliseconds must be finite"));
    }

    let whole = ms.floor();
    if whole < i64::MIN as f64 || whole > i64::MAX as f64 {
        return Err(format_error(ms, "epoch milliseconds out of range"));
    }

    // Sub-millisecond remainder, kept to the nearest nanosecond
    let frac_ns = ((ms - whole) * 1_000_000.0).round() as i64;

    DateTime::from_timestamp_millis(whole as i64)
        .and_then(|t| t.checked_add_signed(TimeDelta::nanoseconds(frac_ns)))
        .ok_or_else(|| format_error(ms, "epoch milliseconds out of range"))
}

fn parse_text(s: &str) -> TelemetryResult<DateTime<Utc>> {
    let trimmed = s.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(t.with_timezone(&Utc));
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .map(|t| t.and_utc())
        .ok_or_else(|| format_error(s, "not RFC 3339 or YYYY-MM-DD HH:MM:SS"))
}

fn format_error(input: impl std::fmt::Debug, reason: &str) -> TelemetryError {
    TelemetryError::TimestampFormat {
        input: format!("{:?}", input),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::TimeZone;
    use serde_json::json;

    fn ten_oclock() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2019, 5, 6, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_all_representations_agree() {
        let expected = ten_oclock();
        let mst = FixedOffset::west_opt(7 * 3600).unwrap();

        let inputs = vec![
            RawTimestamp::Utc(expected),
            RawTimestamp::Offset(expected.with_timezone(&mst)),
            RawTimestamp::Naive(expected.naive_utc()),
            RawTimestamp::EpochMillis(expected.timestamp_millis() as f64),
            RawTimestamp::Text("2019-05-06T10:00:00Z".to_string()),
            RawTimestamp::Text("2019-05-06T03:00:00-07:00".to_string()),
            RawTimestamp::Text("2019-05-06 10:00:00".to_string()),
        ];

        for input in inputs {
            assert_eq!(input.normalize().unwrap(), expected, "{:?}", input);
        }
    }

    #[test]
    fn test_fractional_epoch_millis() {
        let t = RawTimestamp::EpochMillis(1500.5).normalize().unwrap();
        assert_eq!(t.timestamp(), 1);
        assert_eq!(t.timestamp_subsec_nanos(), 500_500_000);
    }

    #[test]
    fn test_rejects_garbage() {
        assert_matches!(
            RawTimestamp::Text("yesterday-ish".to_string()).normalize(),
            Err(TelemetryError::TimestampFormat { .. })
        );
        assert_matches!(
            RawTimestamp::EpochMillis(f64::NAN).normalize(),
            Err(TelemetryError::TimestampFormat { .. })
        );
        assert_matches!(
            RawTimestamp::EpochMillis(1e300).normalize(),
            Err(TelemetryError::TimestampFormat { .. })
        );
    }

    #[test]
    fn test_from_json() {
        assert_eq!(
            RawTimestamp::from_json(&json!("2019-05-06T10:00:00Z")).unwrap(),
            RawTimestamp::Text("2019-05-06T10:00:00Z".to_string())
        );
        assert_eq!(
            RawTimestamp::from_json(&json!(1557136800000i64)).unwrap(),
            RawTimestamp::EpochMillis(1557136800000.0)
        );
        assert_matches!(
            RawTimestamp::from_json(&json!(true)),
            Err(TelemetryError::TimestampFormat { .. })
        );
        assert_matches!(
            RawTimestamp::from_json(&json!(null)),
            Err(TelemetryError::TimestampFormat { .. })
        );
    }
}

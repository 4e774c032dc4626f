//! Serde helpers for the persisted JSON shape.
//!
//! The payload under the storage key is written by browsers as well as by
//! this crate, so reads are forgiving: a single odd field must not turn a
//! whole notebook into "corrupt, start from scratch".

use chrono::{DateTime, SecondsFormat, SubsecRound, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serializer};
use serde_json::Value;

/// Format a timestamp the way `Date.prototype.toISOString` does.
pub fn format_iso(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an RFC 3339 / ISO-8601 timestamp with an offset.
pub fn parse_iso(input: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(input.trim())
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

/// Drop sub-millisecond precision so a timestamp survives a save/load cycle.
pub fn truncate_millis(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(3)
}

/// Optional timestamp: RFC 3339 strings or epoch milliseconds. Anything
/// else reads as `None`.
pub mod timestamp {
    use super::*;

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(at) => serializer.serialize_str(&format_iso(at)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(timestamp_from_value(&Value::deserialize(deserializer)?))
    }
}

/// Read a timestamp out of an arbitrary JSON value.
pub fn timestamp_from_value(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => parse_iso(s),
        Value::Number(n) => n
            .as_i64()
            .and_then(|millis| Utc.timestamp_millis_opt(millis).single()),
        _ => None,
    }
}

/// Optional course coordinate: accepts numbers and numeric strings.
pub mod coordinate {
    use super::*;

    pub fn serialize<S>(value: &Option<u32>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(n) => serializer.serialize_u32(*n),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(coordinate_from_value(&Value::deserialize(deserializer)?))
    }
}

/// Read a course coordinate out of an arbitrary JSON value.
pub fn coordinate_from_value(value: &Value) -> Option<u32> {
    unsigned_from_value(value).and_then(|n| u32::try_from(n).ok())
}

/// A non-negative integer given as a number, an integral float or a numeric string.
pub fn unsigned_from_value(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

/// Any field: a value of the wrong shape reads as the type's default.
pub fn or_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    Ok(serde_json::from_value(Value::deserialize(deserializer)?).unwrap_or_default())
}

/// Text field: `null` reads as empty, numbers and booleans as their text.
pub fn text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(text_from_value(Value::deserialize(deserializer)?))
}

pub(crate) fn text_from_value(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Tag list: `null` reads as empty, non-string entries are dropped, and a
/// single comma-separated string is split.
pub fn tags<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect(),
        Value::String(s) => quadern_tags::parse_tag_list(&s),
        _ => Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn iso_matches_browser_format() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        assert_eq!(format_iso(&at), "2023-11-14T22:13:20.123Z");
        assert_eq!(parse_iso("2023-11-14T22:13:20.123Z"), Some(at));
    }

    #[test]
    fn iso_accepts_offsets() {
        let at = parse_iso("2024-01-01T01:00:00+01:00").unwrap();
        assert_eq!(at, Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
        assert_eq!(parse_iso("yesterday"), None);
    }

    #[test]
    fn truncation_keeps_millis() {
        let at = Utc.timestamp_nanos(1_700_000_000_123_456_789);
        assert_eq!(truncate_millis(at).timestamp_millis(), 1_700_000_000_123);
        assert_eq!(truncate_millis(at).timestamp_subsec_nanos(), 123_000_000);
    }

    #[test]
    fn coordinates_are_lenient() {
        assert_eq!(coordinate_from_value(&json!(3)), Some(3));
        assert_eq!(coordinate_from_value(&json!(4.0)), Some(4));
        assert_eq!(coordinate_from_value(&json!(" 7 ")), Some(7));
        assert_eq!(coordinate_from_value(&json!(0)), Some(0));
        assert_eq!(coordinate_from_value(&json!(5_000_000_000u64)), None);
        assert_eq!(coordinate_from_value(&json!(2.5)), None);
        assert_eq!(coordinate_from_value(&json!(-1)), None);
        assert_eq!(coordinate_from_value(&json!("U1")), None);
        assert_eq!(coordinate_from_value(&json!(null)), None);
    }

    #[test]
    fn timestamps_accept_epoch_millis() {
        let at = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        assert_eq!(timestamp_from_value(&json!(1_700_000_000_000i64)), Some(at));
        assert_eq!(timestamp_from_value(&json!("2023-11-14T22:13:20.000Z")), Some(at));
        assert_eq!(timestamp_from_value(&json!(1.5)), None);
        assert_eq!(timestamp_from_value(&json!(true)), None);
        assert_eq!(timestamp_from_value(&json!(null)), None);
    }

    #[test]
    fn wrong_shape_reads_as_default() {
        #[derive(Deserialize)]
        struct Holder {
            #[serde(deserialize_with = "or_default")]
            meta: std::collections::BTreeMap<String, u32>,
        }
        let holder: Holder = serde_json::from_value(json!({ "meta": "broken" })).unwrap();
        assert!(holder.meta.is_empty());
        let holder: Holder = serde_json::from_value(json!({ "meta": { "a": 1 } })).unwrap();
        assert_eq!(holder.meta.get("a"), Some(&1));
    }

    #[test]
    fn text_from_odd_values() {
        assert_eq!(text_from_value(json!(null)), "");
        assert_eq!(text_from_value(json!(12)), "12");
        assert_eq!(text_from_value(json!("a")), "a");
    }
}

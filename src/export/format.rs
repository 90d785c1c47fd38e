//! Cell value formatting
//!
//! Timestamps are converted to the header's zone and rendered as RFC 3339
//! with second precision. A non-empty value map then substitutes the
//! stringified value when it has a matching key.

use std::collections::BTreeMap;

use chrono::SecondsFormat;
use chrono_tz::Tz;

use crate::store::Value;

/// Parse an IANA zone name; empty or unknown names yield `None`
pub fn parse_timezone(name: &str) -> Option<Tz> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    name.parse::<Tz>().ok()
}

/// Format a raw value for output
///
/// # Arguments
/// * `value` - Raw field value
/// * `zone` - Target zone for timestamps; `None` renders in UTC
/// * `value_map` - Substitutions keyed by the stringified value
///
/// # Returns
/// * `Value` - Display value
pub fn format_value(
    value: Value,
    zone: Option<Tz>,
    value_map: &BTreeMap<String, serde_json::Value>,
) -> Value {
    let value = match value {
        Value::DateTime(dt) => Value::Text(match zone {
            Some(tz) => dt.with_timezone(&tz).to_rfc3339_opts(SecondsFormat::Secs, true),
            None => dt.to_rfc3339_opts(SecondsFormat::Secs, true),
        }),
        other => other,
    };

    if value_map.is_empty() {
        return value;
    }

    match value_map.get(&value.to_string()) {
        Some(mapped) => Value::from(mapped.clone()),
        None => value,
    }
}

/// Format with a zone given by name; invalid names fall back to UTC
pub fn format_with_timezone(
    value: Value,
    timezone: &str,
    value_map: &BTreeMap<String, serde_json::Value>,
) -> Value {
    format_value(value, parse_timezone(timezone), value_map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn created() -> Value {
        Value::DateTime(Utc.with_ymd_and_hms(2023, 6, 11, 5, 57, 46).unwrap())
    }

    #[test]
    fn test_timestamp_in_zone() {
        let none = BTreeMap::new();
        assert_eq!(
            format_with_timezone(created(), "Asia/Ho_Chi_Minh", &none),
            Value::Text("2023-06-11T12:57:46+07:00".into())
        );
        assert_eq!(
            format_with_timezone(created(), "", &none),
            Value::Text("2023-06-11T05:57:46Z".into())
        );
    }

    #[test]
    fn test_invalid_zone_falls_back_to_utc() {
        let none = BTreeMap::new();
        assert_eq!(
            format_with_timezone(created(), "Mars/Olympus", &none),
            Value::Text("2023-06-11T05:57:46Z".into())
        );
        assert!(parse_timezone("Mars/Olympus").is_none());
        assert!(parse_timezone("Europe/Paris").is_some());
    }

    #[test]
    fn test_value_map_substitution() {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), serde_json::json!("Apple"));
        map.insert("true".to_string(), serde_json::json!("Yes"));
        map.insert("2".to_string(), serde_json::json!(20));

        assert_eq!(format_value("a".into(), None, &map), Value::Text("Apple".into()));
        assert_eq!(format_value("b".into(), None, &map), Value::Text("b".into()));
        assert_eq!(format_value(Value::Bool(true), None, &map), Value::Text("Yes".into()));
        assert_eq!(format_value(Value::Int(2), None, &map), Value::Int(20));
        assert_eq!(format_value(Value::Int(3), None, &map), Value::Int(3));
    }

    #[test]
    fn test_value_map_applies_after_zone_conversion() {
        let mut map = BTreeMap::new();
        map.insert("2023-06-11T12:57:46+07:00".to_string(), serde_json::json!("launch"));

        assert_eq!(
            format_with_timezone(created(), "Asia/Ho_Chi_Minh", &map),
            Value::Text("launch".into())
        );
    }

    #[test]
    fn test_non_timestamps_pass_through() {
        let none = BTreeMap::new();
        assert_eq!(format_value(Value::Float(1.5), parse_timezone("UTC"), &none), Value::Float(1.5));
        assert_eq!(format_value(Value::Null, None, &none), Value::Null);
    }
}

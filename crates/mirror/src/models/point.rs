//! Time-series point model

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Value of a point's single field
///
/// Query responses carry values as text. A numeric parse is attempted first;
/// anything that is not a number is kept verbatim as a string.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Float(f64),
    Text(String),
}

impl FieldValue {
    /// Coerce a raw response cell into a typed value
    pub fn coerce(raw: &str) -> Self {
        match raw.parse::<f64>() {
            Ok(number) => FieldValue::Float(number),
            Err(_) => FieldValue::Text(raw.to_string()),
        }
    }
}

/// One time-series sample
///
/// Immutable after construction; produced by the response parser and
/// consumed exactly once by a batch write.
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    pub measurement: String,
    pub field: String,
    pub value: FieldValue,
    pub timestamp: DateTime<Utc>,
    pub tags: BTreeMap<String, String>,
}

impl Point {
    /// Create a point with no tags
    pub fn new(
        measurement: impl Into<String>,
        field: impl Into<String>,
        value: FieldValue,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            measurement: measurement.into(),
            field: field.into(),
            value,
            timestamp,
            tags: BTreeMap::new(),
        }
    }

    /// Attach a tag (builder-style)
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Render as one InfluxDB line-protocol entry with nanosecond precision
    pub fn to_line_protocol(&self) -> String {
        let mut line = escape_measurement(&self.measurement);
        for (key, value) in &self.tags {
            line.push(',');
            line.push_str(&escape_tag(key));
            line.push('=');
            line.push_str(&escape_tag(value));
        }
        line.push(' ');
        line.push_str(&escape_tag(&self.field));
        line.push('=');
        match &self.value {
            FieldValue::Float(number) => line.push_str(&number.to_string()),
            FieldValue::Text(text) => {
                line.push('"');
                line.push_str(&text.replace('\\', "\\\\").replace('"', "\\\""));
                line.push('"');
            }
        }
        line.push(' ');
        // Saturates outside the nanosecond-representable range (years ~1678-2262)
        let nanos = self.timestamp.timestamp_nanos_opt().unwrap_or(i64::MAX);
        line.push_str(&nanos.to_string());
        line
    }
}

fn escape_measurement(name: &str) -> String {
    name.replace(',', "\\,").replace(' ', "\\ ")
}

fn escape_tag(text: &str) -> String {
    text.replace(',', "\\,")
        .replace('=', "\\=")
        .replace(' ', "\\ ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_coerce_numeric() {
        assert_eq!(FieldValue::coerce("42.5"), FieldValue::Float(42.5));
        assert_eq!(FieldValue::coerce("-3"), FieldValue::Float(-3.0));
        assert_eq!(FieldValue::coerce("1e6"), FieldValue::Float(1_000_000.0));
    }

    #[test]
    fn test_coerce_text_fallback() {
        assert_eq!(FieldValue::coerce("on"), FieldValue::Text("on".to_string()));
        assert_eq!(FieldValue::coerce(""), FieldValue::Text(String::new()));
        assert_eq!(
            FieldValue::coerce("42.5C"),
            FieldValue::Text("42.5C".to_string())
        );
    }

    #[test]
    fn test_line_protocol_float() {
        let ts = Utc.with_ymd_and_hms(2022, 3, 1, 12, 0, 0).unwrap();
        let point = Point::new("temperature", "celsius", FieldValue::Float(21.5), ts)
            .with_tag("host", "rig-7");
        assert_eq!(
            point.to_line_protocol(),
            format!(
                "temperature,host=rig-7 celsius=21.5 {}",
                ts.timestamp_nanos_opt().unwrap()
            )
        );
    }

    #[test]
    fn test_line_protocol_text_value() {
        let ts = Utc.with_ymd_and_hms(2022, 3, 1, 12, 0, 0).unwrap();
        let point = Point::new(
            "valve",
            "state",
            FieldValue::Text("half \"open\"".to_string()),
            ts,
        );
        let line = point.to_line_protocol();
        assert!(line.starts_with("valve state=\"half \\\"open\\\"\" "));
    }

    #[test]
    fn test_line_protocol_escaping() {
        let ts = Utc.with_ymd_and_hms(2022, 3, 1, 12, 0, 0).unwrap();
        let point = Point::new("my measurement", "value", FieldValue::Float(1.0), ts)
            .with_tag("site name", "plant,a");
        let line = point.to_line_protocol();
        assert!(line.starts_with("my\\ measurement,site\\ name=plant\\,a value=1 "));
    }

    #[test]
    fn test_tags_are_deterministically_ordered() {
        let ts = Utc.with_ymd_and_hms(2022, 3, 1, 12, 0, 0).unwrap();
        let point = Point::new("m", "f", FieldValue::Float(0.0), ts)
            .with_tag("zeta", "1")
            .with_tag("alpha", "2");
        let line = point.to_line_protocol();
        assert!(line.starts_with("m,alpha=2,zeta=1 "));
    }
}

//! Wire-level metric records.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ProtoError;
use crate::text::format_gauge;

/// The two metric families.
///
/// Counters accumulate: every update adds its delta to the stored total.
/// Gauges overwrite: the last written value wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// Additive signed 64-bit metric.
    Counter,
    /// Last-write-wins floating-point metric.
    Gauge,
}

impl MetricKind {
    /// Parses a kind string case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns `ProtoError::UnsupportedKind` for anything other than
    /// `counter` or `gauge`.
    pub fn parse(raw: &str) -> Result<Self, ProtoError> {
        match raw.to_ascii_lowercase().as_str() {
            "counter" => Ok(Self::Counter),
            "gauge" => Ok(Self::Gauge),
            _ => Err(ProtoError::UnsupportedKind {
                kind: raw.to_string(),
            }),
        }
    }

    /// Returns the canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MetricKind {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for MetricKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MetricKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(D::Error::custom)
    }
}

/// A single metric record as exchanged over HTTP.
///
/// Exactly one of `delta` / `value` is populated, matching `kind`:
/// counters carry `delta`, gauges carry `value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    /// Metric name.
    pub id: String,
    /// Counter or gauge.
    #[serde(rename = "type")]
    pub kind: MetricKind,
    /// Counter increment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    /// Gauge value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

impl Metric {
    /// Creates a counter record.
    #[must_use]
    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Counter,
            delta: Some(delta),
            value: None,
        }
    }

    /// Creates a gauge record.
    #[must_use]
    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Gauge,
            delta: None,
            value: Some(value),
        }
    }

    /// Renders the record as JSON with the canonical gauge formatting.
    ///
    /// `serde_json` prints `42.0` for a whole-numbered double; the canonical
    /// rendering trims it to `42`, so gauge responses are assembled by hand.
    #[must_use]
    pub fn render_json(&self) -> String {
        let id = serde_json::to_string(&self.id).unwrap_or_else(|_| "\"\"".to_string());
        match (self.kind, self.delta, self.value) {
            (MetricKind::Counter, Some(delta), _) => {
                format!(r#"{{"id":{id},"type":"counter","delta":{delta}}}"#)
            }
            (MetricKind::Gauge, _, Some(value)) => {
                format!(
                    r#"{{"id":{id},"type":"{}","value":{}}}"#,
                    self.kind,
                    format_gauge(value)
                )
            }
            _ => serde_json::to_string(self)
                .unwrap_or_else(|_| format!(r#"{{"id":{id},"type":"{}"}}"#, self.kind)),
        }
    }

    /// Renders a batch of records as a JSON array with canonical formatting.
    #[must_use]
    pub fn render_json_array(metrics: &[Self]) -> String {
        let items: Vec<String> = metrics.iter().map(Self::render_json).collect();
        format!("[{}]", items.join(","))
    }
}

/// A leniently-typed inbound record.
///
/// Request bodies are decoded into this shape first so that a missing `id`,
/// a missing `type` and an unknown `type` each produce their own
/// validation error instead of a generic JSON parse failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MetricPayload {
    /// Metric name, empty when absent.
    #[serde(default)]
    pub id: String,
    /// Raw metric type, empty when absent.
    #[serde(default, rename = "type")]
    pub kind: String,
    /// Counter increment.
    #[serde(default)]
    pub delta: Option<i64>,
    /// Gauge value.
    #[serde(default)]
    pub value: Option<f64>,
}

impl MetricPayload {
    /// Validates the payload and converts it into a typed [`Metric`].
    ///
    /// # Errors
    ///
    /// Returns a validation error when the name or type is empty, the type
    /// is unknown, or the value field required by the type is missing.
    pub fn into_metric(self) -> Result<Metric, ProtoError> {
        if self.id.is_empty() {
            return Err(ProtoError::EmptyName);
        }
        let kind = MetricKind::parse(&self.kind)?;
        match kind {
            MetricKind::Counter => {
                let delta = self.delta.ok_or(ProtoError::MissingDelta)?;
                Ok(Metric::counter(self.id, delta))
            }
            MetricKind::Gauge => {
                let value = self.value.ok_or(ProtoError::MissingValue)?;
                Ok(Metric::gauge(self.id, value))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod kind_tests {
        use super::*;

        #[test]
        fn parse_lowercase() {
            assert_eq!(MetricKind::parse("counter").unwrap(), MetricKind::Counter);
            assert_eq!(MetricKind::parse("gauge").unwrap(), MetricKind::Gauge);
        }

        #[test]
        fn parse_is_case_insensitive() {
            assert_eq!(MetricKind::parse("Counter").unwrap(), MetricKind::Counter);
            assert_eq!(MetricKind::parse("GAUGE").unwrap(), MetricKind::Gauge);
        }

        #[test]
        fn parse_rejects_unknown() {
            assert!(MetricKind::parse("histogram").is_err());
            assert!(MetricKind::parse("").is_err());
        }

        #[test]
        fn display_is_lowercase() {
            assert_eq!(MetricKind::Counter.to_string(), "counter");
            assert_eq!(MetricKind::Gauge.to_string(), "gauge");
        }

        #[test]
        fn deserialize_mixed_case() {
            let m: Metric =
                serde_json::from_str(r#"{"id":"x","type":"Gauge","value":1.5}"#).unwrap();
            assert_eq!(m.kind, MetricKind::Gauge);
        }
    }

    mod metric_tests {
        use super::*;

        #[test]
        fn counter_roundtrip() {
            let m = Metric::counter("requests", 7);
            let json = serde_json::to_string(&m).unwrap();
            let back: Metric = serde_json::from_str(&json).unwrap();
            assert_eq!(back, m);
            assert!(!json.contains("value"));
        }

        #[test]
        fn gauge_roundtrip() {
            let m = Metric::gauge("temp", 36.6);
            let json = serde_json::to_string(&m).unwrap();
            let back: Metric = serde_json::from_str(&json).unwrap();
            assert_eq!(back, m);
            assert!(!json.contains("delta"));
        }

        #[test]
        fn render_counter() {
            let m = Metric::counter("hits", 42);
            assert_eq!(m.render_json(), r#"{"id":"hits","type":"counter","delta":42}"#);
        }

        #[test]
        fn render_gauge_trims_trailing_zeros() {
            let m = Metric::gauge("load", 42.0);
            assert_eq!(m.render_json(), r#"{"id":"load","type":"gauge","value":42}"#);
        }

        #[test]
        fn render_gauge_keeps_fraction() {
            let m = Metric::gauge("load", 2.5);
            assert_eq!(m.render_json(), r#"{"id":"load","type":"gauge","value":2.5}"#);
        }

        #[test]
        fn render_array() {
            let batch = vec![Metric::counter("c", 1), Metric::gauge("g", 1.5)];
            assert_eq!(
                Metric::render_json_array(&batch),
                r#"[{"id":"c","type":"counter","delta":1},{"id":"g","type":"gauge","value":1.5}]"#
            );
        }

        #[test]
        fn render_escapes_name() {
            let m = Metric::counter("we\"ird", 1);
            let parsed: serde_json::Value = serde_json::from_str(&m.render_json()).unwrap();
            assert_eq!(parsed["id"], "we\"ird");
        }
    }

    mod payload_tests {
        use super::*;

        #[test]
        fn payload_missing_fields_is_decodable() {
            let p: MetricPayload = serde_json::from_str("{}").unwrap();
            assert!(p.id.is_empty());
            assert!(p.kind.is_empty());
        }

        #[test]
        fn payload_empty_name_rejected() {
            let p: MetricPayload =
                serde_json::from_str(r#"{"type":"counter","delta":1}"#).unwrap();
            assert!(matches!(p.into_metric(), Err(ProtoError::EmptyName)));
        }

        #[test]
        fn payload_counter_requires_delta() {
            let p: MetricPayload =
                serde_json::from_str(r#"{"id":"c","type":"counter"}"#).unwrap();
            assert!(matches!(p.into_metric(), Err(ProtoError::MissingDelta)));
        }

        #[test]
        fn payload_gauge_requires_value() {
            let p: MetricPayload = serde_json::from_str(r#"{"id":"g","type":"gauge"}"#).unwrap();
            assert!(matches!(p.into_metric(), Err(ProtoError::MissingValue)));
        }

        #[test]
        fn payload_unknown_kind_rejected() {
            let p: MetricPayload =
                serde_json::from_str(r#"{"id":"x","type":"timer","value":1.0}"#).unwrap();
            assert!(matches!(
                p.into_metric(),
                Err(ProtoError::UnsupportedKind { .. })
            ));
        }

        #[test]
        fn payload_converts_to_metric() {
            let p: MetricPayload =
                serde_json::from_str(r#"{"id":"g","type":"Gauge","value":9.25}"#).unwrap();
            let m = p.into_metric().unwrap();
            assert_eq!(m, Metric::gauge("g", 9.25));
        }
    }
}

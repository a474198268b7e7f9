//! Firehose envelope model.
//!
//! Envelopes arrive from the upstream transport as one of four message kinds.
//! Gauges are further split into container and value metrics by [`Envelope::stream_key`].

use crate::core::error::{NozzleError, Result};
use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;

/// Gauge field names that together identify a container metric.
pub const CONTAINER_METRIC_FIELDS: [&str; 5] = ["cpu", "memory", "disk", "memory_quota", "disk_quota"];

/// One unit of incoming telemetry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Emission time in nanoseconds since the epoch
    #[serde(default)]
    pub timestamp: i64,
    /// Application guid for app-scoped envelopes, component name otherwise
    #[serde(default)]
    pub source_id: String,
    /// Application instance index as reported by the platform
    #[serde(default)]
    pub instance_id: String,
    /// Tag bag (origin, deployment, job, index, ip, ...)
    #[serde(default)]
    pub tags: HashMap<String, String>,
    /// Typed payload
    pub message: Message,
}

/// Envelope payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Message {
    Gauge(Gauge),
    Counter(Counter),
    Timer(Timer),
    Log(Log),
}

/// A bag of named gauge readings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Gauge {
    #[serde(default)]
    pub metrics: HashMap<String, GaugeValue>,
}

/// A single gauge reading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GaugeValue {
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub value: f64,
}

/// Counter increment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Counter {
    pub name: String,
    #[serde(default)]
    pub delta: u64,
    #[serde(default)]
    pub total: u64,
}

/// HTTP request timing, start and stop in nanoseconds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timer {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub start: i64,
    #[serde(default)]
    pub stop: i64,
}

/// Application log line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Log {
    #[serde(default, serialize_with = "serialize_payload", deserialize_with = "deserialize_payload")]
    pub payload: Bytes,
    #[serde(default, rename = "type")]
    pub log_type: LogType,
}

/// Output stream a log line was written to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogType {
    #[default]
    Out,
    Err,
}

impl LogType {
    pub fn as_str(self) -> &'static str {
        match self {
            LogType::Out => "OUT",
            LogType::Err => "ERR",
        }
    }
}

fn serialize_payload<S: Serializer>(payload: &Bytes, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&String::from_utf8_lossy(payload))
}

fn deserialize_payload<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Bytes, D::Error> {
    let text = String::deserialize(deserializer)?;
    Ok(Bytes::from(text))
}

/// Canonical routing key. Gauges are split in two by a field-name heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StreamKey {
    ContainerMetric,
    ValueMetric,
    Counter,
    Timer,
    Log,
}

impl StreamKey {
    /// All routing keys, in a stable order.
    pub const ALL: [StreamKey; 5] = [
        StreamKey::ContainerMetric,
        StreamKey::ValueMetric,
        StreamKey::Counter,
        StreamKey::Timer,
        StreamKey::Log,
    ];

    /// Parse an enabled-type name. Accepts both the v1 event names
    /// (`CounterEvent`, `HttpStartStop`, `LogMessage`) and the v2 message names.
    pub fn from_config_name(name: &str) -> Result<Self> {
        let normalized: String = name.chars().filter(|c| !c.is_whitespace()).collect::<String>().to_lowercase();
        match normalized.as_str() {
            "containermetric" => Ok(StreamKey::ContainerMetric),
            "valuemetric" => Ok(StreamKey::ValueMetric),
            "counterevent" | "counter" => Ok(StreamKey::Counter),
            "httpstartstop" | "timer" => Ok(StreamKey::Timer),
            "logmessage" | "log" => Ok(StreamKey::Log),
            _ => Err(NozzleError::UnknownEnvelopeType(name.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StreamKey::ContainerMetric => "ContainerMetric",
            StreamKey::ValueMetric => "ValueMetric",
            StreamKey::Counter => "Counter",
            StreamKey::Timer => "Timer",
            StreamKey::Log => "Log",
        }
    }
}

impl fmt::Display for StreamKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Envelope {
    /// Build an envelope with empty identity fields.
    pub fn new(message: Message) -> Self {
        Self {
            timestamp: 0,
            source_id: String::new(),
            instance_id: String::new(),
            tags: HashMap::new(),
            message,
        }
    }

    /// Attach a tag, builder style.
    pub fn with_tag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(name.into(), value.into());
        self
    }

    /// Tag value or the empty string when absent.
    pub fn tag(&self, name: &str) -> &str {
        self.tags.get(name).map(String::as_str).unwrap_or("")
    }

    /// v2 message type name used for the `envelope.type` attribute.
    pub fn type_name(&self) -> &'static str {
        match self.message {
            Message::Gauge(_) => "Gauge",
            Message::Counter(_) => "Counter",
            Message::Timer(_) => "Timer",
            Message::Log(_) => "Log",
        }
    }

    /// Instance index parsed from `instance_id`, zero when unparseable.
    pub fn instance_index(&self) -> i32 {
        self.instance_id.trim().parse().unwrap_or(0)
    }

    pub fn gauge(&self) -> Option<&Gauge> {
        match &self.message {
            Message::Gauge(g) => Some(g),
            _ => None,
        }
    }

    pub fn counter(&self) -> Option<&Counter> {
        match &self.message {
            Message::Counter(c) => Some(c),
            _ => None,
        }
    }

    pub fn timer(&self) -> Option<&Timer> {
        match &self.message {
            Message::Timer(t) => Some(t),
            _ => None,
        }
    }

    pub fn log(&self) -> Option<&Log> {
        match &self.message {
            Message::Log(l) => Some(l),
            _ => None,
        }
    }

    /// Classify the envelope for routing.
    ///
    /// A gauge carrying exactly the five container fields is a container
    /// metric. Any other gauge, including a superset or subset of those
    /// fields, is a value metric.
    pub fn stream_key(&self) -> StreamKey {
        match &self.message {
            Message::Gauge(g) if g.is_container_metric() => StreamKey::ContainerMetric,
            Message::Gauge(_) => StreamKey::ValueMetric,
            Message::Counter(_) => StreamKey::Counter,
            Message::Timer(_) => StreamKey::Timer,
            Message::Log(_) => StreamKey::Log,
        }
    }
}

impl Gauge {
    /// Add a reading, builder style.
    pub fn with(mut self, name: impl Into<String>, value: f64, unit: impl Into<String>) -> Self {
        self.metrics.insert(name.into(), GaugeValue { unit: unit.into(), value });
        self
    }

    /// Reading value, zero when the field is missing.
    pub fn value_of(&self, name: &str) -> f64 {
        self.metrics.get(name).map_or(0.0, |m| m.value)
    }

    pub fn is_container_metric(&self) -> bool {
        self.metrics.len() == CONTAINER_METRIC_FIELDS.len()
            && CONTAINER_METRIC_FIELDS.iter().all(|f| self.metrics.contains_key(*f))
    }
}

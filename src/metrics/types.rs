//! Mergeable metric aggregates.

use crate::core::uid::Uid;
use crate::metrics::attributes::{AttributeSet, AttributeValue};
use std::collections::BTreeMap;
use std::fmt;

/// Declared metric kind.
///
/// The kind is carried through to export but does not alter merge arithmetic:
/// every kind accumulates min, max, sum, last value and sample count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricType {
    Gauge,
    Count,
    Counter,
    Delta,
}

impl MetricType {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricType::Gauge => "Gauge",
            MetricType::Count => "Count",
            MetricType::Counter => "Counter",
            MetricType::Delta => "Delta",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observation about to be merged into a metric.
#[derive(Debug, Clone)]
pub struct Sample {
    pub name: String,
    pub metric_type: MetricType,
    pub unit: String,
    pub value: f64,
    /// Side attributes carried onto the metric
    pub attributes: AttributeSet,
}

impl Sample {
    pub fn new(name: impl Into<String>, metric_type: MetricType, unit: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            metric_type,
            unit: unit.into(),
            value,
            attributes: AttributeSet::new(),
        }
    }

    pub fn gauge(name: impl Into<String>, unit: impl Into<String>, value: f64) -> Self {
        Self::new(name, MetricType::Gauge, unit, value)
    }

    /// Attach a side attribute, overwriting any earlier value.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.set(name, value);
        self
    }
}

/// Running aggregate for one (entity, name, type, unit).
#[derive(Debug, Clone)]
pub struct Metric {
    pub name: String,
    pub metric_type: MetricType,
    pub unit: String,
    pub min: f64,
    pub max: f64,
    pub sum: f64,
    pub last_value: f64,
    pub sample_count: u64,
    attributes: AttributeSet,
}

impl Metric {
    pub fn new(name: impl Into<String>, metric_type: MetricType, unit: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            metric_type,
            unit: unit.into(),
            min: value,
            max: value,
            sum: value,
            last_value: value,
            sample_count: 1,
            attributes: AttributeSet::new(),
        }
    }

    pub fn from_sample(sample: Sample) -> Self {
        let mut metric = Self::new(sample.name, sample.metric_type, sample.unit, sample.value);
        metric.attributes = sample.attributes;
        metric
    }

    /// Identity of a metric under the entity signed `entity`.
    pub fn signature_for(entity: &Uid, name: &str, metric_type: MetricType, unit: &str) -> Uid {
        entity.clone().with(name).with(metric_type).with(unit)
    }

    pub fn signature(&self, entity: &Uid) -> Uid {
        Self::signature_for(entity, &self.name, self.metric_type, &self.unit)
    }

    /// Merge one value.
    pub fn update(&mut self, value: f64) {
        self.last_value = value;
        self.sum += value;
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
        self.sample_count += 1;
    }

    /// Merge a sample: its value and its side attributes (latest wins).
    pub fn merge(&mut self, sample: &Sample) {
        self.update(sample.value);
        for (name, value) in sample.attributes.iter() {
            self.attributes.set(name.clone(), value.clone());
        }
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes.set(name, value);
    }

    pub fn attributes(&self) -> &AttributeSet {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut AttributeSet {
        &mut self.attributes
    }

    /// Flatten into an export payload.
    ///
    /// Fixed fields first, then attributes. Attributes never shadow the fixed fields.
    pub fn to_event(&self) -> BTreeMap<String, AttributeValue> {
        let mut event = BTreeMap::new();
        event.insert("metric.name".to_string(), AttributeValue::from(self.name.as_str()));
        event.insert("metric.type".to_string(), AttributeValue::from(self.metric_type.as_str()));
        event.insert("metric.unit".to_string(), AttributeValue::from(self.unit.as_str()));
        event.insert("metric.min".to_string(), AttributeValue::Float(self.min));
        event.insert("metric.max".to_string(), AttributeValue::Float(self.max));
        event.insert("metric.sum".to_string(), AttributeValue::Float(self.sum));
        event.insert("metric.sample.last.value".to_string(), AttributeValue::Float(self.last_value));
        event.insert("metric.samples.count".to_string(), AttributeValue::from(self.sample_count));
        for (name, value) in self.attributes.iter() {
            event.entry(name.clone()).or_insert_with(|| value.clone());
        }
        event
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_one_through_ten() {
        let mut metric = Metric::new("requests", MetricType::Gauge, "count", 1.0);
        for v in 2..=10 {
            metric.update(f64::from(v));
        }
        assert_eq!(metric.min, 1.0);
        assert_eq!(metric.max, 10.0);
        assert_eq!(metric.sum, 55.0);
        assert_eq!(metric.last_value, 10.0);
        assert_eq!(metric.sample_count, 10);
    }

    #[test]
    fn test_merge_is_uniform_across_types() {
        for kind in [MetricType::Gauge, MetricType::Count, MetricType::Counter, MetricType::Delta] {
            let mut metric = Metric::new("m", kind, "u", 5.0);
            metric.update(3.0);
            assert_eq!(metric.sum, 8.0);
            assert_eq!(metric.last_value, 3.0);
            assert_eq!(metric.min, 3.0);
        }
    }

    #[test]
    fn test_signature_includes_name_type_unit() {
        let entity = Uid::new().with("e");
        let a = Metric::signature_for(&entity, "cpu", MetricType::Gauge, "percent");
        let b = Metric::signature_for(&entity, "cpu", MetricType::Delta, "percent");
        let c = Metric::signature_for(&entity, "cpu", MetricType::Gauge, "bytes");
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.as_str(), "/e/cpu/Gauge/percent");
    }

    #[test]
    fn test_merge_sample_refreshes_side_attributes() {
        let first = Sample::new("requests", MetricType::Delta, "delta", 2.0).with_attribute("total.reported", 10_u64);
        let mut metric = Metric::from_sample(first);
        let second = Sample::new("requests", MetricType::Delta, "delta", 3.0).with_attribute("total.reported", 13_u64);
        metric.merge(&second);
        assert_eq!(metric.sum, 5.0);
        assert_eq!(metric.attributes().get("total.reported"), Some(&AttributeValue::Int(13)));
    }

    #[test]
    fn test_to_event_fields() {
        let mut metric = Metric::new("app.cpu", MetricType::Gauge, "percent", 4.0);
        metric.set_attribute("eventType", "PCFContainerMetric");
        metric.set_attribute("metric.name", "shadowed");
        let event = metric.to_event();
        assert_eq!(event["metric.name"], AttributeValue::from("app.cpu"));
        assert_eq!(event["metric.type"], AttributeValue::from("Gauge"));
        assert_eq!(event["metric.samples.count"], AttributeValue::Int(1));
        assert_eq!(event["metric.sample.last.value"], AttributeValue::Float(4.0));
        assert_eq!(event["eventType"], AttributeValue::from("PCFContainerMetric"));
    }
}

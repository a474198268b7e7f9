//! Entities: the owners of metrics.

use crate::core::uid::Uid;
use crate::metrics::attributes::{AttributeSet, AttributeValue};
use crate::metrics::registry::MetricRegistry;
use crate::metrics::types::{Metric, Sample};
use parking_lot::RwLock;

/// An observed thing (VM, app instance, component) identified by the
/// signature of the attributes it was created with.
///
/// Attributes appended later are exported but never change the signature.
#[derive(Debug)]
pub struct Entity {
    signature: Uid,
    attributes: RwLock<AttributeSet>,
    metrics: MetricRegistry,
}

impl Entity {
    pub fn new(attributes: AttributeSet) -> Self {
        let signature = attributes.signature().clone();
        Self {
            signature,
            attributes: RwLock::new(attributes),
            metrics: MetricRegistry::new(),
        }
    }

    pub fn signature(&self) -> &Uid {
        &self.signature
    }

    /// Snapshot of the current attributes.
    pub fn attributes(&self) -> AttributeSet {
        self.attributes.read().clone()
    }

    pub fn attribute(&self, name: &str) -> Option<AttributeValue> {
        self.attributes.read().get(name).cloned()
    }

    /// First-write-wins append.
    pub fn append_attribute(&self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        self.attributes.write().append(name, value);
    }

    pub fn append_attributes(&self, other: &AttributeSet) {
        self.attributes.write().append_all(other);
    }

    /// Merge a sample into this entity's metrics. Returns the metric signature.
    pub fn record(&self, sample: Sample) -> Uid {
        self.metrics.record(&self.signature, sample)
    }

    pub fn metric(&self, id: &Uid) -> Option<Metric> {
        self.metrics.get(id)
    }

    pub fn metric_count(&self) -> usize {
        self.metrics.len()
    }

    /// Take every metric, leaving the entity empty but alive.
    pub fn drain_metrics(&self) -> Vec<Metric> {
        self.metrics.drain()
    }
}

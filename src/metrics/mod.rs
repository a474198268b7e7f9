//! Metric data model: attribute sets, entities, mergeable metrics and the
//! registries that own them.

pub mod attributes;
pub mod entity;
pub mod registry;
pub mod types;

pub use attributes::{AttributeSet, AttributeValue};
pub use entity::Entity;
pub use registry::{EntityRegistry, MetricRegistry, Registry};
pub use types::{Metric, MetricType, Sample};

//! Per-envelope-type aggregation units.
//!
//! Each accumulator owns its own entity registry. The router feeds it
//! envelopes through [`Accumulator::update`]; the harvester drains it and
//! hands every drained metric back through [`Accumulator::harvest_metric`]
//! for finalization and export.

pub mod base;
pub mod capacity;
pub mod container;
pub mod counter;
pub mod http;
pub mod logmessage;
pub mod value;

pub use base::{platform_attributes, EntityTable};
pub use capacity::CapacityAccumulator;
pub use container::ContainerAccumulator;
pub use counter::CounterAccumulator;
pub use http::HttpAccumulator;
pub use logmessage::{LogFilters, LogMessageAccumulator};
pub use value::ValueAccumulator;

use crate::core::{AppContext, Envelope, StreamKey};
use crate::metrics::{Entity, Metric};
use std::sync::Arc;

/// Aggregation contract shared by every variant.
pub trait Accumulator: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Envelope kinds this accumulator wants.
    fn streams(&self) -> &'static [StreamKey];

    /// Fold one envelope into accumulated state. Never fails.
    fn update(&self, envelope: &Envelope);

    /// Finalize and export one drained metric.
    fn harvest_metric(&self, entity: &Entity, metric: Metric);

    /// Take every accumulated entity.
    fn drain(&self) -> Vec<Arc<Entity>>;
}

/// Builds a fresh accumulator from the shared context.
pub type AccumulatorFactory = fn(&Arc<AppContext>) -> Arc<dyn Accumulator>;

fn new_counter(ctx: &Arc<AppContext>) -> Arc<dyn Accumulator> {
    Arc::new(CounterAccumulator::new(Arc::clone(ctx)))
}

fn new_value(ctx: &Arc<AppContext>) -> Arc<dyn Accumulator> {
    Arc::new(ValueAccumulator::new(Arc::clone(ctx)))
}

fn new_container(ctx: &Arc<AppContext>) -> Arc<dyn Accumulator> {
    Arc::new(ContainerAccumulator::new(Arc::clone(ctx)))
}

fn new_capacity(ctx: &Arc<AppContext>) -> Arc<dyn Accumulator> {
    Arc::new(CapacityAccumulator::new(Arc::clone(ctx)))
}

fn new_logmessage(ctx: &Arc<AppContext>) -> Arc<dyn Accumulator> {
    Arc::new(LogMessageAccumulator::new(Arc::clone(ctx)))
}

fn new_http(ctx: &Arc<AppContext>) -> Arc<dyn Accumulator> {
    Arc::new(HttpAccumulator::new(Arc::clone(ctx)))
}

/// Every known variant, in registration order.
pub const FACTORIES: [(&str, AccumulatorFactory); 6] = [
    ("counter", new_counter),
    ("value", new_value),
    ("container", new_container),
    ("capacity", new_capacity),
    ("logmessage", new_logmessage),
    ("http", new_http),
];

/// Instantiate every accumulator the configuration allows.
pub fn build_all(ctx: &Arc<AppContext>) -> Vec<Arc<dyn Accumulator>> {
    FACTORIES
        .iter()
        .filter(|(name, _)| *name != "capacity" || ctx.config.capacity.enabled)
        .map(|(name, factory)| {
            tracing::debug!("Registering accumulator {}", name);
            factory(ctx)
        })
        .collect()
}

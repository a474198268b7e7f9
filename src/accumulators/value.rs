//! Gauge envelopes that are not container metrics, one gauge per field.

use crate::accumulators::{Accumulator, EntityTable};
use crate::core::{AppContext, Envelope, StreamKey};
use crate::metrics::{Entity, Metric, Sample};
use std::sync::Arc;

pub struct ValueAccumulator {
    table: EntityTable,
}

impl ValueAccumulator {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self {
            table: EntityTable::new(ctx),
        }
    }
}

impl Accumulator for ValueAccumulator {
    fn name(&self) -> &'static str {
        "value"
    }

    fn streams(&self) -> &'static [StreamKey] {
        &[StreamKey::ValueMetric]
    }

    fn update(&self, envelope: &Envelope) {
        let Some(gauge) = envelope.gauge() else {
            return;
        };
        let entity = self.table.entity_for(envelope);
        for (name, reading) in &gauge.metrics {
            entity.record(Sample::gauge(name, &reading.unit, reading.value));
        }
    }

    fn harvest_metric(&self, entity: &Entity, metric: Metric) {
        let event = self.table.finish(entity, metric, &self.table.config().event_types.value);
        self.table.export(None, event);
    }

    fn drain(&self) -> Vec<Arc<Entity>> {
        self.table.drain()
    }
}

//! Counter envelopes folded into one delta metric per counter name.

use crate::accumulators::{Accumulator, EntityTable};
use crate::core::{AppContext, Envelope, StreamKey};
use crate::metrics::{Entity, Metric, MetricType, Sample};
use std::sync::Arc;

pub struct CounterAccumulator {
    table: EntityTable,
}

impl CounterAccumulator {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self {
            table: EntityTable::new(ctx),
        }
    }
}

impl Accumulator for CounterAccumulator {
    fn name(&self) -> &'static str {
        "counter"
    }

    fn streams(&self) -> &'static [StreamKey] {
        &[StreamKey::Counter]
    }

    fn update(&self, envelope: &Envelope) {
        let Some(counter) = envelope.counter() else {
            return;
        };
        let entity = self.table.entity_for(envelope);
        entity.record(
            Sample::new(&counter.name, MetricType::Delta, "delta", counter.delta as f64)
                .with_attribute("total.reported", counter.total),
        );
    }

    fn harvest_metric(&self, entity: &Entity, metric: Metric) {
        let event_type = &self.table.config().event_types.counter;
        let event = self.table.finish(entity, metric, event_type);
        self.table.export(None, event);
    }

    fn drain(&self) -> Vec<Arc<Entity>> {
        self.table.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulators::base::test_support::Harness;
    use crate::core::types::{Counter, Message};
    use crate::core::Config;
    use crate::metrics::AttributeValue;
    use pretty_assertions::assert_eq;

    fn counter(name: &str, delta: u64, total: u64) -> Envelope {
        Envelope::new(Message::Counter(Counter {
            name: name.to_string(),
            delta,
            total,
        }))
        .with_tag("origin", "gorouter")
        .with_tag("job", "router")
    }

    #[tokio::test]
    async fn test_deltas_sum_and_total_is_latest() {
        let harness = Harness::new(Config::default());
        let acc = CounterAccumulator::new(Arc::clone(&harness.ctx));

        acc.update(&counter("total_requests", 5, 105));
        acc.update(&counter("total_requests", 7, 112));

        let events = harness.harvest(&acc).await;
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event["metric.name"], AttributeValue::from("total_requests"));
        assert_eq!(event["metric.type"], AttributeValue::from("Delta"));
        assert_eq!(event["metric.unit"], AttributeValue::from("delta"));
        assert_eq!(event["metric.sum"], AttributeValue::Float(12.0));
        assert_eq!(event["metric.samples.count"], AttributeValue::Int(2));
        assert_eq!(event["total.reported"], AttributeValue::Int(112));
        assert_eq!(event["eventType"], AttributeValue::from("PCFCounterEvent"));
        assert_eq!(event["pcf.origin"], AttributeValue::from("gorouter"));

        assert!(harness.harvest(&acc).await.is_empty());
    }

    #[test]
    fn test_ignores_other_messages() {
        let harness = Harness::new(Config::default());
        let acc = CounterAccumulator::new(Arc::clone(&harness.ctx));
        acc.update(&Envelope::new(Message::Gauge(Default::default())));
        assert!(acc.drain().is_empty());
    }
}

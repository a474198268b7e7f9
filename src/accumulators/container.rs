//! Per app instance CPU, memory and disk usage.

use crate::accumulators::{Accumulator, EntityTable};
use crate::core::{AppContext, Envelope, StreamKey};
use crate::metrics::{Entity, Metric, Sample};
use std::sync::Arc;

const CPU: &str = "app.cpu";
const DISK: &str = "app.disk";
const MEMORY: &str = "app.memory";

pub struct ContainerAccumulator {
    table: EntityTable,
}

impl ContainerAccumulator {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self {
            table: EntityTable::new(ctx),
        }
    }
}

/// Usage as a percentage of the `<name>.quota` side attribute.
///
/// `None` when the quota is missing or not positive.
fn percent_used(metric: &Metric) -> Option<f64> {
    let quota = metric.attributes().float_value_of(&format!("{}.quota", metric.name));
    (quota > 0.0).then(|| metric.last_value / quota * 100.0)
}

impl Accumulator for ContainerAccumulator {
    fn name(&self) -> &'static str {
        "container"
    }

    fn streams(&self) -> &'static [StreamKey] {
        &[StreamKey::ContainerMetric]
    }

    fn update(&self, envelope: &Envelope) {
        let Some(gauge) = envelope.gauge() else {
            return;
        };
        let entity = self.table.entity_for(envelope);
        entity.append_attributes(
            &self
                .table
                .ctx()
                .metadata
                .app_instance_attributes(&envelope.source_id, envelope.instance_index()),
        );

        entity.record(Sample::gauge(CPU, "percent", gauge.value_of("cpu")));
        entity.record(
            Sample::gauge(DISK, "bytes", gauge.value_of("disk")).with_attribute("app.disk.quota", gauge.value_of("disk_quota")),
        );
        entity.record(
            Sample::gauge(MEMORY, "bytes", gauge.value_of("memory"))
                .with_attribute("app.memory.quota", gauge.value_of("memory_quota")),
        );
    }

    fn harvest_metric(&self, entity: &Entity, mut metric: Metric) {
        if metric.name != CPU {
            match percent_used(&metric) {
                Some(used) => {
                    let name = format!("{}.used", metric.name);
                    metric.set_attribute(name, used);
                },
                None => tracing::debug!("No quota for {} on {}, skipping usage", metric.name, entity.signature()),
            }
        }

        let credentials = self.table.credentials_for(entity);
        let event = self.table.finish(entity, metric, &self.table.config().event_types.container);
        self.table.export(credentials.as_ref(), event);
    }

    fn drain(&self) -> Vec<Arc<Entity>> {
        self.table.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulators::base::test_support::{gauge_envelope, Harness};
    use crate::core::types::Gauge;
    use crate::core::Config;
    use crate::export::Credentials;
    use crate::metadata::StaticMetadata;
    use crate::metrics::{AttributeSet, AttributeValue};
    use pretty_assertions::assert_eq;

    fn container_envelope(app_id: &str, memory: f64, memory_quota: f64) -> Envelope {
        let gauge = Gauge::default()
            .with("cpu", 12.5, "percentage")
            .with("memory", memory, "bytes")
            .with("disk", 100.0, "bytes")
            .with("memory_quota", memory_quota, "bytes")
            .with("disk_quota", 0.0, "bytes");
        let mut envelope = gauge_envelope(gauge);
        envelope.source_id = app_id.to_string();
        envelope.instance_id = "1".to_string();
        envelope
    }

    fn by_name<'a>(events: &'a [crate::export::Event], name: &str) -> &'a crate::export::Event {
        events
            .iter()
            .find(|e| e["metric.name"] == AttributeValue::from(name))
            .unwrap()
    }

    #[tokio::test]
    async fn test_three_metrics_with_usage() {
        let metadata = Arc::new(StaticMetadata::new());
        metadata.insert_app("app-guid", AttributeSet::new().with("app.name", "billing"));
        let harness = Harness::with_metadata(Config::default(), metadata);
        let acc = ContainerAccumulator::new(Arc::clone(&harness.ctx));

        acc.update(&container_envelope("app-guid", 256.0, 1024.0));

        let events = harness.harvest(&acc).await;
        assert_eq!(events.len(), 3);

        let memory = by_name(&events, "app.memory");
        assert_eq!(memory["app.memory.quota"], AttributeValue::Float(1024.0));
        assert_eq!(memory["app.memory.used"], AttributeValue::Float(25.0));
        assert_eq!(memory["app.name"], AttributeValue::from("billing"));
        assert_eq!(memory["pcf.app.id"], AttributeValue::from("app-guid"));
        assert_eq!(memory["eventType"], AttributeValue::from("PCFContainerMetric"));

        let cpu = by_name(&events, "app.cpu");
        assert_eq!(cpu["metric.unit"], AttributeValue::from("percent"));
        assert!(!cpu.contains_key("app.cpu.used"));

        let disk = by_name(&events, "app.disk");
        assert!(!disk.contains_key("app.disk.used"));
    }

    #[tokio::test]
    async fn test_tenant_credentials_used_when_known() {
        let metadata = Arc::new(StaticMetadata::new());
        metadata.insert_credentials("tenant-app", Credentials::for_app("tenant-key", "7", "license"));
        let harness = Harness::with_metadata(Config::default(), metadata);
        let acc = ContainerAccumulator::new(Arc::clone(&harness.ctx));

        acc.update(&container_envelope("tenant-app", 1.0, 2.0));
        acc.update(&container_envelope("other-app", 1.0, 2.0));

        for entity in acc.drain() {
            for metric in entity.drain_metrics() {
                acc.harvest_metric(&entity, metric);
            }
        }
        harness.ctx.exporter.flush_all().await;

        assert_eq!(harness.sink.events_for("tenant-key").len(), 3);
        assert_eq!(harness.sink.events_for("").len(), 3);
    }
}

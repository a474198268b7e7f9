//! Entity bookkeeping shared by all accumulators.

use crate::core::{AppContext, Config, Envelope, StreamKey};
use crate::export::{Credentials, Event};
use crate::metrics::{AttributeSet, Entity, EntityRegistry, Metric};
use std::sync::Arc;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Identity attributes of the component or app instance that emitted `envelope`.
pub fn platform_attributes(envelope: &Envelope, config: &Config) -> AttributeSet {
    let mut attrs = AttributeSet::new();
    attrs.append(config.attribute_name("envelope.type"), envelope.type_name());
    attrs.append(config.attribute_name("origin"), envelope.tag("origin"));
    attrs.append(config.attribute_name("deployment"), envelope.tag("deployment"));
    attrs.append(config.attribute_name("job"), envelope.tag("job"));
    attrs.append(config.attribute_name("index"), envelope.tag("index"));
    attrs.append(config.attribute_name("IP"), envelope.tag("ip"));

    if matches!(envelope.stream_key(), StreamKey::Log | StreamKey::ContainerMetric) {
        attrs.append(config.attribute_name("app.id"), &envelope.source_id);
        attrs.append(config.attribute_name("app.instance.index"), &envelope.instance_id);
    }

    attrs.set(config.attribute_name("domain"), &config.attributes.domain);
    if !config.attributes.domain_alias.is_empty() {
        attrs.set(&config.attributes.domain_alias, &config.attributes.domain);
    }
    attrs.set("agent.version", AGENT_VERSION);
    attrs.set("agent.instance", config.agent.instance_index);
    attrs.set("agent.ip", &config.agent.ip);
    attrs
}

/// Entity registry plus the context needed to finalize and export.
#[derive(Debug)]
pub struct EntityTable {
    entities: EntityRegistry,
    ctx: Arc<AppContext>,
}

impl EntityTable {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self {
            entities: EntityRegistry::new(),
            ctx,
        }
    }

    pub fn ctx(&self) -> &AppContext {
        &self.ctx
    }

    pub fn config(&self) -> &Config {
        &self.ctx.config
    }

    /// Entity for the envelope's platform attributes, created when unseen.
    pub fn entity_for(&self, envelope: &Envelope) -> Arc<Entity> {
        let attrs = platform_attributes(envelope, &self.ctx.config);
        let id = attrs.signature().clone();
        self.entities.get_or_insert_with(&id, || Entity::new(attrs))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn drain(&self) -> Vec<Arc<Entity>> {
        self.entities.drain()
    }

    /// Tenant credentials for the app an entity belongs to, if any.
    pub fn credentials_for(&self, entity: &Entity) -> Option<Credentials> {
        let app_id = entity.attribute(&self.ctx.config.attribute_name("app.id"))?;
        let app_id = app_id.as_str()?;
        if app_id.is_empty() {
            return None;
        }
        self.ctx.metadata.app_credentials(app_id)
    }

    /// Tag a drained metric with its event type and the entity attributes.
    ///
    /// Attributes already on the metric take precedence over entity attributes.
    pub fn finish(&self, entity: &Entity, mut metric: Metric, event_type: &str) -> Event {
        metric.set_attribute("eventType", event_type);
        metric.set_attribute("agent.subscription", &self.ctx.config.firehose.subscription_id);
        metric.attributes_mut().append_all(&entity.attributes());
        metric.to_event()
    }

    pub fn export(&self, credentials: Option<&Credentials>, event: Event) {
        self.ctx.exporter.enqueue(credentials, event);
    }
}

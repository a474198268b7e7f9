//! HTTP timer envelopes forwarded as one timing event each.

use crate::accumulators::{Accumulator, EntityTable};
use crate::core::{AppContext, Envelope, StreamKey};
use crate::export::Event;
use crate::metrics::{AttributeSet, Entity, Metric};
use std::sync::Arc;

const NANOS_PER_MILLI: f64 = 1_000_000.0;

pub struct HttpAccumulator {
    table: EntityTable,
}

impl HttpAccumulator {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        Self {
            table: EntityTable::new(ctx),
        }
    }

    fn timing_event(&self, envelope: &Envelope, entity: &Entity) -> Option<Event> {
        let timer = envelope.timer()?;
        let config = self.table.config();
        let mut event = AttributeSet::new();

        event.set("http.duration", timer.stop.wrapping_sub(timer.start) as f64 / NANOS_PER_MILLI);
        if let Ok(length) = envelope.tag("content_length").parse::<i64>() {
            event.set("http.content.length", length);
        }
        if let Ok(status) = envelope.tag("status_code").parse::<i64>() {
            event.set("http.status", status);
        }
        event.set("http.uri", envelope.tag("uri"));
        event.set("http.method", envelope.tag("method"));
        event.set("http.peer.type", envelope.tag("peer_type"));
        event.set("http.start.timestamp", timer.start);
        event.set("http.stop.timestamp", timer.stop);
        event.set("http.remote.address", envelope.tag("remote_address"));
        event.set("http.user.agent", envelope.tag("user_agent"));
        event.set("http.request.id", envelope.tag("request_id"));
        event.set("agent.subscription", &config.firehose.subscription_id);
        event.set("eventType", &config.event_types.http);
        event.append_all(&entity.attributes());

        Some(event.to_map())
    }
}

impl Accumulator for HttpAccumulator {
    fn name(&self) -> &'static str {
        "http"
    }

    fn streams(&self) -> &'static [StreamKey] {
        &[StreamKey::Timer]
    }

    fn update(&self, envelope: &Envelope) {
        if envelope.timer().is_none() {
            return;
        }
        let entity = self.table.entity_for(envelope);
        if let Some(event) = self.timing_event(envelope, &entity) {
            self.table.export(None, event);
        }
    }

    fn harvest_metric(&self, _entity: &Entity, _metric: Metric) {}

    fn drain(&self) -> Vec<Arc<Entity>> {
        self.table.drain()
    }
}

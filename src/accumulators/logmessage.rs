//! Application log lines forwarded as one event each.

use crate::accumulators::{Accumulator, EntityTable};
use crate::core::config::LogMessageConfig;
use crate::core::{AppContext, Envelope, StreamKey};
use crate::export::Event;
use crate::metrics::{AttributeSet, Entity, Metric};
use std::sync::Arc;

/// Largest payload forwarded untouched, in bytes.
pub const MAX_MESSAGE_BYTES: usize = 4096;

/// Include and exclude filters on source type and message text.
///
/// Source filters match the trimmed filter exactly. Message filters match
/// when the message contains the trimmed filter. An empty include list
/// includes everything.
#[derive(Debug, Clone, Default)]
pub struct LogFilters {
    source_include: Vec<String>,
    source_exclude: Vec<String>,
    message_include: Vec<String>,
    message_exclude: Vec<String>,
}

fn trimmed(list: &[String]) -> Vec<String> {
    list.iter()
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .collect()
}

impl LogFilters {
    pub fn from_config(config: &LogMessageConfig) -> Self {
        Self {
            source_include: trimmed(&config.source_include),
            source_exclude: trimmed(&config.source_exclude),
            message_include: trimmed(&config.message_include),
            message_exclude: trimmed(&config.message_exclude),
        }
    }

    pub fn enabled(&self) -> bool {
        !(self.source_include.is_empty()
            && self.source_exclude.is_empty()
            && self.message_include.is_empty()
            && self.message_exclude.is_empty())
    }

    pub fn is_included(&self, message: &str, source: &str) -> bool {
        let source_ok = self.source_include.is_empty() || self.source_include.iter().any(|f| f == source);
        let message_ok = self.message_include.is_empty() || self.message_include.iter().any(|f| message.contains(f.as_str()));
        source_ok && message_ok
    }

    pub fn is_excluded(&self, message: &str, source: &str) -> bool {
        self.source_exclude.iter().any(|f| f == source)
            || self.message_exclude.iter().any(|f| message.contains(f.as_str()))
    }

    /// Include check first, then exclude.
    pub fn accepts(&self, message: &str, source: &str) -> bool {
        !self.enabled() || (self.is_included(message, source) && !self.is_excluded(message, source))
    }
}

/// Cut a payload longer than [`MAX_MESSAGE_BYTES`] down to at most one byte
/// less, backing off to the last complete UTF-8 character.
///
/// Returns the text and whether it was cut.
pub fn truncate_payload(payload: &[u8]) -> (String, bool) {
    if payload.len() > MAX_MESSAGE_BYTES {
        let limit = MAX_MESSAGE_BYTES - 1;
        let head = &payload[..limit];
        let head = match std::str::from_utf8(head) {
            Err(e) if e.error_len().is_none() => &head[..e.valid_up_to()],
            _ => head,
        };
        // Replacement characters can still grow invalid input past the limit.
        let mut text = String::from_utf8_lossy(head).into_owned();
        if text.len() > limit {
            let mut end = limit;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            text.truncate(end);
        }
        (text, true)
    } else {
        (String::from_utf8_lossy(payload).into_owned(), false)
    }
}

pub struct LogMessageAccumulator {
    table: EntityTable,
    filters: LogFilters,
}

impl LogMessageAccumulator {
    pub fn new(ctx: Arc<AppContext>) -> Self {
        let filters = LogFilters::from_config(&ctx.config.logmessage);
        if filters.enabled() {
            tracing::debug!("Log message filters enabled");
        } else {
            tracing::debug!("Log message filters disabled");
        }
        Self {
            table: EntityTable::new(ctx),
            filters,
        }
    }

    fn log_event(&self, envelope: &Envelope, entity: &Entity) -> Option<Event> {
        let log = envelope.log()?;
        let ctx = self.table.ctx();
        let source_type = envelope.tag("source_type");

        let mut event = AttributeSet::new();

        let (message, truncated) = truncate_payload(&log.payload);
        if truncated {
            event.set("log.message.truncated", true);
        }
        let timestamp_ms = envelope.timestamp / 1_000_000;

        event.set("log.message", message);
        event.set("timestamp", timestamp_ms);
        event.set("log.timestamp", timestamp_ms);
        event.set("log.app.id", &envelope.source_id);
        event.set("log.source.type", source_type);
        event.set("log.source.instance", &envelope.instance_id);
        event.set("log.message.type", log.log_type.as_str());
        event.set("eventType", &ctx.config.event_types.log);
        event.set("agent.subscription", &ctx.config.firehose.subscription_id);
        event.append_all(&entity.attributes());

        Some(event.to_map())
    }
}

impl Accumulator for LogMessageAccumulator {
    fn name(&self) -> &'static str {
        "logmessage"
    }

    fn streams(&self) -> &'static [StreamKey] {
        &[StreamKey::Log]
    }

    fn update(&self, envelope: &Envelope) {
        let Some(log) = envelope.log() else {
            return;
        };
        if self.filters.enabled() {
            let message = String::from_utf8_lossy(&log.payload);
            if !self.filters.accepts(&message, envelope.tag("source_type")) {
                tracing::trace!("Filtered log line from {}", envelope.source_id);
                return;
            }
        }

        let entity = self.table.entity_for(envelope);
        entity.append_attributes(
            &self
                .table
                .ctx()
                .metadata
                .app_instance_attributes(&envelope.source_id, envelope.instance_index()),
        );
        if let Some(event) = self.log_event(envelope, &entity) {
            let credentials = self.table.credentials_for(&entity);
            self.table.export(credentials.as_ref(), event);
        }
    }

    fn harvest_metric(&self, _entity: &Entity, _metric: Metric) {}

    fn drain(&self) -> Vec<Arc<Entity>> {
        self.table.drain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulators::base::test_support::Harness;
    use crate::core::types::{Log, LogType, Message};
    use crate::core::Config;
    use crate::metadata::PLACEHOLDER;
    use crate::metrics::AttributeValue;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    fn log_envelope(payload: impl Into<Bytes>, source_type: &str) -> Envelope {
        let mut envelope = Envelope::new(Message::Log(Log {
            payload: payload.into(),
            log_type: LogType::Err,
        }))
        .with_tag("source_type", source_type)
        .with_tag("job", "diego_cell");
        envelope.timestamp = 1_600_000_000_123_456_789;
        envelope.source_id = "app-guid".to_string();
        envelope.instance_id = "2".to_string();
        envelope
    }

    fn filters(source_include: &[&str], source_exclude: &[&str], message_include: &[&str], message_exclude: &[&str]) -> LogFilters {
        let list = |v: &[&str]| v.iter().map(|s| s.to_string()).collect();
        LogFilters::from_config(&LogMessageConfig {
            source_include: list(source_include),
            source_exclude: list(source_exclude),
            message_include: list(message_include),
            message_exclude: list(message_exclude),
        })
    }

    #[test]
    fn test_truncation_boundary() {
        let exact = vec![b'a'; MAX_MESSAGE_BYTES];
        let (text, truncated) = truncate_payload(&exact);
        assert!(!truncated);
        assert_eq!(text.len(), 4096);

        let over = vec![b'a'; MAX_MESSAGE_BYTES + 1];
        let (text, truncated) = truncate_payload(&over);
        assert!(truncated);
        assert_eq!(text.len(), 4095);
    }

    #[test]
    fn test_truncation_keeps_whole_characters() {
        let mut payload = vec![b'a'; MAX_MESSAGE_BYTES - 2];
        payload.extend_from_slice("étail".as_bytes());
        assert_eq!(payload.len(), 4100);

        let (text, truncated) = truncate_payload(&payload);
        assert!(truncated);
        assert!(text.len() <= MAX_MESSAGE_BYTES - 1);
        assert_eq!(text.len(), 4094);
        assert!(!text.contains('\u{FFFD}'));

        let mut invalid = vec![0xFF; 10];
        invalid.extend(vec![b'a'; MAX_MESSAGE_BYTES]);
        let (text, truncated) = truncate_payload(&invalid);
        assert!(truncated);
        assert!(text.len() <= MAX_MESSAGE_BYTES - 1);
        assert!(text.starts_with('\u{FFFD}'));
    }

    #[test]
    fn test_filters() {
        assert!(!LogFilters::default().enabled());
        assert!(LogFilters::default().accepts("anything", "APP"));

        let f = filters(&[" APP/PROC/WEB "], &[], &[], &["healthcheck"]);
        assert!(f.enabled());
        assert!(f.accepts("GET /orders", "APP/PROC/WEB"));
        assert!(!f.accepts("GET /orders", "RTR"));
        assert!(!f.accepts("GET /healthcheck", "APP/PROC/WEB"));

        let f = filters(&[], &["STG"], &["ERROR"], &[]);
        assert!(f.accepts("ERROR boom", "APP"));
        assert!(!f.accepts("INFO fine", "APP"));
        assert!(!f.accepts("ERROR boom", "STG"));
    }

    #[tokio::test]
    async fn test_log_event_fields() {
        let harness = Harness::new(Config::default());
        let acc = LogMessageAccumulator::new(Arc::clone(&harness.ctx));

        acc.update(&log_envelope("something failed", "APP/PROC/WEB"));

        let events = harness.flush().await;
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event["log.message"], AttributeValue::from("something failed"));
        assert_eq!(event["timestamp"], AttributeValue::Int(1_600_000_000_123));
        assert_eq!(event["log.timestamp"], AttributeValue::Int(1_600_000_000_123));
        assert_eq!(event["log.app.id"], AttributeValue::from("app-guid"));
        assert_eq!(event["log.source.type"], AttributeValue::from("APP/PROC/WEB"));
        assert_eq!(event["log.source.instance"], AttributeValue::from("2"));
        assert_eq!(event["log.message.type"], AttributeValue::from("ERR"));
        assert_eq!(event["eventType"], AttributeValue::from("PCFLogMessage"));
        assert_eq!(event["app.name"], AttributeValue::from(PLACEHOLDER));
        assert_eq!(event["pcf.app.id"], AttributeValue::from("app-guid"));
        assert!(!event.contains_key("log.message.truncated"));
        assert!(!event.contains_key("metric.name"));

        // Forwarded immediately; nothing is left to harvest.
        assert!(harness.harvest(&acc).await.is_empty());
    }

    #[test]
    fn test_entity_enriched_with_app_metadata() {
        let harness = Harness::new(Config::default());
        let acc = LogMessageAccumulator::new(Arc::clone(&harness.ctx));
        acc.update(&log_envelope("hello", "APP/PROC/WEB"));

        let entities = acc.drain();
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].attribute("app.space.name"), Some(AttributeValue::from(PLACEHOLDER)));
    }

    #[tokio::test]
    async fn test_long_message_flagged() {
        let harness = Harness::new(Config::default());
        let acc = LogMessageAccumulator::new(Arc::clone(&harness.ctx));

        acc.update(&log_envelope(vec![b'x'; 4097], "APP"));

        let events = harness.flush().await;
        assert_eq!(events[0]["log.message.truncated"], AttributeValue::Bool(true));
        assert_eq!(events[0]["log.message"].to_string().len(), 4095);
    }

    #[tokio::test]
    async fn test_filtered_lines_are_dropped() {
        let mut config = Config::default();
        config.logmessage.source_exclude = vec!["RTR".to_string()];
        let harness = Harness::new(config);
        let acc = LogMessageAccumulator::new(Arc::clone(&harness.ctx));

        acc.update(&log_envelope("GET / 200", "RTR"));
        acc.update(&log_envelope("started", "APP"));

        let events = harness.flush().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["log.source.type"], AttributeValue::from("APP"));
    }
}

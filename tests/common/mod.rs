//! Common test utilities and fixtures.

#![allow(dead_code)]

use bytes::Bytes;
use nozzle_lib::core::types::{Counter, Gauge, Log, LogType, Timer};
use nozzle_lib::core::{Config, Envelope, Message};
use nozzle_lib::export::{Event, MemorySink};
use nozzle_lib::metadata::StaticMetadata;
use nozzle_lib::router::Poll;
use nozzle_lib::Application;
use std::sync::Arc;

/// Envelope builder with platform tags filled in.
pub struct TestEnvelopeBuilder {
    envelope: Envelope,
}

impl TestEnvelopeBuilder {
    pub fn new(message: Message) -> Self {
        let envelope = Envelope::new(message)
            .with_tag("origin", "rep")
            .with_tag("deployment", "cf")
            .with_tag("job", "diego_cell")
            .with_tag("index", "0")
            .with_tag("ip", "10.0.0.5");
        Self { envelope }
    }

    pub fn counter(name: &str, delta: u64, total: u64) -> Self {
        Self::new(Message::Counter(Counter {
            name: name.to_string(),
            delta,
            total,
        }))
        .job("router")
    }

    pub fn gauge(gauge: Gauge) -> Self {
        Self::new(Message::Gauge(gauge))
    }

    pub fn container(app_id: &str, instance: u32, memory: f64, memory_quota: f64) -> Self {
        Self::new(Message::Gauge(
            Gauge::default()
                .with("cpu", 5.0, "percentage")
                .with("memory", memory, "bytes")
                .with("memory_quota", memory_quota, "bytes")
                .with("disk", 100.0, "bytes")
                .with("disk_quota", 400.0, "bytes"),
        ))
        .app(app_id, instance)
    }

    pub fn log(app_id: &str, text: &str) -> Self {
        Self::new(Message::Log(Log {
            payload: Bytes::from(text.to_string()),
            log_type: LogType::Out,
        }))
        .app(app_id, 0)
        .tag("source_type", "APP/PROC/WEB")
    }

    pub fn timer(start: i64, stop: i64) -> Self {
        Self::new(Message::Timer(Timer {
            name: "http".to_string(),
            start,
            stop,
        }))
        .job("router")
    }

    pub fn job(self, job: &str) -> Self {
        self.tag("job", job)
    }

    pub fn tag(mut self, name: &str, value: &str) -> Self {
        self.envelope = self.envelope.with_tag(name, value);
        self
    }

    pub fn app(mut self, app_id: &str, instance: u32) -> Self {
        self.envelope.source_id = app_id.to_string();
        self.envelope.instance_id = instance.to_string();
        self
    }

    pub fn timestamp(mut self, nanos: i64) -> Self {
        self.envelope.timestamp = nanos;
        self
    }

    pub fn build(self) -> Envelope {
        self.envelope
    }
}

/// A fully wired application that records exports instead of sending them.
pub struct TestPipeline {
    pub app: Application,
    pub sink: Arc<MemorySink>,
    pub metadata: Arc<StaticMetadata>,
}

impl TestPipeline {
    pub fn new(config: Config) -> Self {
        let sink = Arc::new(MemorySink::new());
        let metadata = Arc::new(StaticMetadata::new());
        Self::with_metadata(config, metadata, sink)
    }

    pub fn with_metadata(config: Config, metadata: Arc<StaticMetadata>, sink: Arc<MemorySink>) -> Self {
        let app = Application::with_collaborators(config, metadata.clone(), sink.clone())
            .expect("valid test configuration");
        Self { app, sink, metadata }
    }

    pub fn push(&self, envelope: Envelope) {
        self.app.buffer().set(envelope);
    }

    /// Route until the buffer is empty, returning how many envelopes moved.
    pub fn route_all(&self) -> usize {
        let mut routed = 0;
        while let Poll::Routed(..) = self.app.router().poll_once() {
            routed += 1;
        }
        routed
    }

    /// Run one harvest and return everything exported since the last call.
    pub async fn harvest(&self) -> Vec<Event> {
        self.app.harvester().harvest().await;
        let events = self.sink.events();
        self.sink.clear();
        events
    }
}

/// Events with the given `eventType`.
pub fn of_type<'a>(events: &'a [Event], event_type: &str) -> Vec<&'a Event> {
    events
        .iter()
        .filter(|e| e.get("eventType").and_then(|v| v.as_str()) == Some(event_type))
        .collect()
}

/// First event whose `metric.name` matches.
pub fn metric<'a>(events: &'a [Event], name: &str) -> Option<&'a Event> {
    events
        .iter()
        .find(|e| e.get("metric.name").and_then(|v| v.as_str()) == Some(name))
}

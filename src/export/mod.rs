//! Outbound export of harvested metrics and forwarded events.
//!
//! Events are queued per credential set and delivered to an [`EventSink`]
//! when the harvester calls [`ClientManager::flush_all`]. Each client holds
//! at most [`MAX_PENDING_PER_CLIENT`] events between flushes; the oldest are
//! dropped past that.

use crate::core::config::ExportConfig;
use crate::core::Result;
use crate::metrics::AttributeValue;
use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

/// Flattened export payload.
pub type Event = BTreeMap<String, AttributeValue>;

/// Pending events one client holds before the oldest are dropped.
pub const MAX_PENDING_PER_CLIENT: usize = 10_000;

/// License keys issued in the EU region carry this prefix.
const EU_LICENSE_PREFIX: &str = "eu01x";

/// Ingest region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Region {
    #[default]
    Us,
    Eu,
}

impl Region {
    /// Parse a configured region name, defaulting to US.
    pub fn from_name(name: &str) -> Self {
        if name.trim().eq_ignore_ascii_case("eu") {
            Region::Eu
        } else {
            Region::Us
        }
    }

    pub fn from_license_key(license_key: &str) -> Self {
        if license_key.starts_with(EU_LICENSE_PREFIX) {
            Region::Eu
        } else {
            Region::Us
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Region::Us => "US",
            Region::Eu => "EU",
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tenant credentials for one export client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Credentials {
    pub insert_key: String,
    pub account_id: String,
    pub region: Region,
}

impl Credentials {
    pub fn new(insert_key: impl Into<String>, account_id: impl Into<String>, region: Region) -> Self {
        Self {
            insert_key: insert_key.into(),
            account_id: account_id.into(),
            region,
        }
    }

    /// Per-application credentials; the region follows the license key.
    pub fn for_app(insert_key: impl Into<String>, account_id: impl Into<String>, license_key: &str) -> Self {
        Self::new(insert_key, account_id, Region::from_license_key(license_key))
    }

    pub fn from_config(config: &ExportConfig) -> Self {
        Self::new(&config.insert_key, &config.account_id, Region::from_name(&config.region))
    }
}

/// Destination for flushed batches.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver one batch on behalf of `credentials`.
    async fn send(&self, credentials: &Credentials, events: Vec<Event>) -> Result<()>;

    fn name(&self) -> &'static str;
}

/// Writes one JSON object per line to stdout.
#[derive(Debug, Default)]
pub struct StdoutSink;

#[async_trait]
impl EventSink for StdoutSink {
    async fn send(&self, credentials: &Credentials, events: Vec<Event>) -> Result<()> {
        let mut out = Vec::with_capacity(events.len() * 256);
        for event in &events {
            serde_json::to_writer(&mut out, event)?;
            out.push(b'\n');
        }
        let mut stdout = tokio::io::stdout();
        stdout.write_all(&out).await?;
        stdout.flush().await?;
        tracing::debug!(
            "Wrote {} events for account {} ({})",
            events.len(),
            credentials.account_id,
            credentials.region
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "stdout"
    }
}

/// Keeps every delivered event in memory, tagged with its insert key.
#[derive(Debug, Default)]
pub struct MemorySink {
    delivered: Mutex<Vec<(String, Event)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.delivered.lock().iter().map(|(_, e)| e.clone()).collect()
    }

    pub fn events_for(&self, insert_key: &str) -> Vec<Event> {
        self.delivered
            .lock()
            .iter()
            .filter(|(key, _)| key == insert_key)
            .map(|(_, e)| e.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.delivered.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.delivered.lock().is_empty()
    }

    pub fn clear(&self) {
        self.delivered.lock().clear();
    }
}

#[async_trait]
impl EventSink for MemorySink {
    async fn send(&self, credentials: &Credentials, events: Vec<Event>) -> Result<()> {
        let mut delivered = self.delivered.lock();
        delivered.extend(events.into_iter().map(|e| (credentials.insert_key.clone(), e)));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Pending events for one credential set.
#[derive(Debug)]
struct Client {
    credentials: Credentials,
    pending: Mutex<VecDeque<Event>>,
}

/// Per-credential client cache, safe for concurrent use by every accumulator.
pub struct ClientManager {
    default_credentials: Credentials,
    clients: DashMap<String, Arc<Client>>,
    sink: Arc<dyn EventSink>,
    max_pending: usize,
    enqueued: AtomicU64,
    dropped: AtomicU64,
    flushed: AtomicU64,
    failed_flushes: AtomicU64,
}

impl ClientManager {
    pub fn new(default_credentials: Credentials, sink: Arc<dyn EventSink>) -> Self {
        Self {
            default_credentials,
            clients: DashMap::new(),
            sink,
            max_pending: MAX_PENDING_PER_CLIENT,
            enqueued: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            flushed: AtomicU64::new(0),
            failed_flushes: AtomicU64::new(0),
        }
    }

    /// Override the per-client pending cap (minimum 1).
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending.max(1);
        self
    }

    pub fn stdout(default_credentials: Credentials) -> Self {
        Self::new(default_credentials, Arc::new(StdoutSink))
    }

    pub fn default_credentials(&self) -> &Credentials {
        &self.default_credentials
    }

    fn client(&self, credentials: &Credentials) -> Arc<Client> {
        if let Some(client) = self.clients.get(&credentials.insert_key) {
            return Arc::clone(client.value());
        }
        let entry = self.clients.entry(credentials.insert_key.clone()).or_insert_with(|| {
            tracing::debug!("Creating export client for account {}", credentials.account_id);
            Arc::new(Client {
                credentials: credentials.clone(),
                pending: Mutex::new(VecDeque::new()),
            })
        });
        Arc::clone(entry.value())
    }

    /// Queue an event under `credentials`, or the defaults when `None`.
    ///
    /// A full queue drops its oldest event to make room.
    pub fn enqueue(&self, credentials: Option<&Credentials>, event: Event) {
        let credentials = credentials.unwrap_or(&self.default_credentials);
        let client = self.client(credentials);
        let overflowed = {
            let mut pending = client.pending.lock();
            let overflowed = pending.len() >= self.max_pending && pending.pop_front().is_some();
            pending.push_back(event);
            overflowed
        };
        self.enqueued.fetch_add(1, Ordering::Relaxed);

        if overflowed {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            if dropped.is_power_of_two() {
                tracing::warn!(
                    "Export queue full for account {}, {} event(s) dropped so far",
                    credentials.account_id,
                    dropped
                );
            }
        }
    }

    /// Deliver every pending batch, one send per client, concurrently.
    /// Failed batches are logged and dropped.
    ///
    /// Returns the number of events delivered.
    pub async fn flush_all(&self) -> usize {
        let batches: Vec<(Arc<Client>, Vec<Event>)> = self
            .clients
            .iter()
            .filter_map(|c| {
                let batch = Vec::from(std::mem::take(&mut *c.pending.lock()));
                (!batch.is_empty()).then(|| (Arc::clone(c.value()), batch))
            })
            .collect();

        let sends = batches.into_iter().map(|(client, batch)| async move {
            let count = batch.len();
            let result = self.sink.send(&client.credentials, batch).await;
            (client, count, result)
        });

        let mut delivered = 0;
        for (client, count, result) in join_all(sends).await {
            match result {
                Ok(()) => {
                    delivered += count;
                    self.flushed.fetch_add(count as u64, Ordering::Relaxed);
                },
                Err(e) => {
                    self.failed_flushes.fetch_add(1, Ordering::Relaxed);
                    tracing::error!(
                        "Export via {} failed for account {}, dropping {} events: {}",
                        self.sink.name(),
                        client.credentials.account_id,
                        count,
                        e
                    );
                },
            }
        }

        delivered
    }

    pub fn pending(&self) -> usize {
        self.clients.iter().map(|c| c.pending.lock().len()).sum()
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn stats(&self) -> ExportStats {
        ExportStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            flushed: self.flushed.load(Ordering::Relaxed),
            failed_flushes: self.failed_flushes.load(Ordering::Relaxed),
            clients: self.clients.len(),
        }
    }
}

impl fmt::Debug for ClientManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientManager")
            .field("sink", &self.sink.name())
            .field("clients", &self.clients.len())
            .finish()
    }
}

/// Export counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ExportStats {
    pub enqueued: u64,
    pub dropped: u64,
    pub flushed: u64,
    pub failed_flushes: u64,
    pub clients: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::NozzleError;

    fn event(name: &str) -> Event {
        let mut e = Event::new();
        e.insert("metric.name".to_string(), AttributeValue::from(name));
        e
    }

    #[test]
    fn test_region_from_license_key() {
        assert_eq!(Region::from_license_key("eu01xx0123"), Region::Eu);
        assert_eq!(Region::from_license_key("0123abcd"), Region::Us);
        assert_eq!(Region::from_name("eu"), Region::Eu);
        assert_eq!(Region::from_name("anything"), Region::Us);
    }

    #[tokio::test]
    async fn test_flush_routes_by_credentials() {
        let sink = Arc::new(MemorySink::new());
        let manager = ClientManager::new(Credentials::new("default", "1", Region::Us), sink.clone());
        let tenant = Credentials::for_app("tenant", "2", "eu01xkey");

        manager.enqueue(None, event("a"));
        manager.enqueue(Some(&tenant), event("b"));
        manager.enqueue(Some(&tenant), event("c"));
        assert_eq!(manager.pending(), 3);
        assert_eq!(manager.client_count(), 2);

        assert_eq!(manager.flush_all().await, 3);
        assert_eq!(manager.pending(), 0);
        assert_eq!(sink.events_for("default").len(), 1);
        assert_eq!(sink.events_for("tenant").len(), 2);

        assert_eq!(manager.flush_all().await, 0);
        assert_eq!(sink.len(), 3);
    }

    #[tokio::test]
    async fn test_stdout_sink_sends() {
        let sink = StdoutSink;
        assert!(sink.send(&Credentials::default(), vec![event("a")]).await.is_ok());
        assert!(sink.send(&Credentials::default(), Vec::new()).await.is_ok());
    }

    #[tokio::test]
    async fn test_full_queue_drops_oldest() {
        let sink = Arc::new(MemorySink::new());
        let manager = ClientManager::new(Credentials::default(), sink.clone()).with_max_pending(2);

        for name in ["a", "b", "c", "d"] {
            manager.enqueue(None, event(name));
        }
        assert_eq!(manager.pending(), 2);

        let stats = manager.stats();
        assert_eq!(stats.enqueued, 4);
        assert_eq!(stats.dropped, 2);

        assert_eq!(manager.flush_all().await, 2);
        let names: Vec<_> = sink.events().into_iter().map(|e| e["metric.name"].clone()).collect();
        assert_eq!(names, vec![AttributeValue::from("c"), AttributeValue::from("d")]);
    }

    #[test]
    fn test_default_pending_cap() {
        let manager = ClientManager::new(Credentials::default(), Arc::new(MemorySink::new()));
        for _ in 0..MAX_PENDING_PER_CLIENT + 5 {
            manager.enqueue(None, Event::new());
        }
        assert_eq!(manager.pending(), MAX_PENDING_PER_CLIENT);
        assert_eq!(manager.stats().dropped, 5);
    }

    struct FailingSink;

    #[async_trait]
    impl EventSink for FailingSink {
        async fn send(&self, _: &Credentials, _: Vec<Event>) -> Result<()> {
            Err(NozzleError::export("ingest unavailable"))
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    #[tokio::test]
    async fn test_failed_flush_is_counted_not_propagated() {
        let manager = ClientManager::new(Credentials::default(), Arc::new(FailingSink));
        manager.enqueue(None, event("a"));
        assert_eq!(manager.flush_all().await, 0);
        let stats = manager.stats();
        assert_eq!(stats.enqueued, 1);
        assert_eq!(stats.flushed, 0);
        assert_eq!(stats.failed_flushes, 1);
        assert_eq!(manager.pending(), 0);
    }
}

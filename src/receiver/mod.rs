//! Upstream firehose transport and the ingest buffer it feeds.
//!
//! The transport owns the network side: it connects, decodes envelopes and
//! writes them into the [`IngestBuffer`]. The router only ever asks it to
//! restart when the stream goes quiet.

pub mod buffer;

pub use buffer::{BufferStats, IngestBuffer};

use crate::core::retry::{Backoff, RetryConfig};
use crate::core::{Envelope, NozzleError, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

/// Upstream connection controlled by the pipeline.
pub trait Transport: Send + Sync {
    /// Begin delivering envelopes into the buffer.
    fn start(&self) -> Result<()>;

    /// Drop the current connection and establish a new one.
    fn restart(&self);

    /// Stop delivering. Idempotent.
    fn close(&self);

    /// Envelopes delivered since the last reset.
    fn event_count(&self) -> u64;

    fn reset_event_count(&self);

    /// Restarts requested so far.
    fn restarts(&self) -> u64;
}

/// Reads newline-delimited JSON envelopes from a TCP stream.
pub struct TcpLinesTransport {
    address: String,
    buffer: Arc<IngestBuffer<Envelope>>,
    retry: RetryConfig,
    events: Arc<AtomicU64>,
    restarts: AtomicU64,
    closed: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TcpLinesTransport {
    pub fn new(address: impl Into<String>, buffer: Arc<IngestBuffer<Envelope>>) -> Self {
        Self {
            address: address.into(),
            buffer,
            retry: RetryConfig::default(),
            events: Arc::new(AtomicU64::new(0)),
            restarts: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    fn spawn_reader(&self) -> Result<()> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| NozzleError::network(format!("transport needs a tokio runtime: {}", e)))?;

        let task = handle.spawn(read_upstream(
            self.address.clone(),
            Arc::clone(&self.buffer),
            Arc::clone(&self.events),
            self.retry.clone(),
        ));

        if let Some(previous) = self.task.lock().replace(task) {
            previous.abort();
        }
        Ok(())
    }
}

impl Transport for TcpLinesTransport {
    fn start(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(NozzleError::network("transport already closed"));
        }
        tracing::info!("Starting upstream transport for {}", self.address);
        self.spawn_reader()
    }

    fn restart(&self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        self.restarts.fetch_add(1, Ordering::Relaxed);
        tracing::warn!("Restarting upstream connection to {}", self.address);
        if let Err(e) = self.spawn_reader() {
            tracing::error!("Failed to restart upstream transport: {}", e);
        }
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(task) = self.task.lock().take() {
            task.abort();
        }
        tracing::info!("Upstream transport for {} closed", self.address);
    }

    fn event_count(&self) -> u64 {
        self.events.load(Ordering::Relaxed)
    }

    fn reset_event_count(&self) {
        self.events.store(0, Ordering::Relaxed);
    }

    fn restarts(&self) -> u64 {
        self.restarts.load(Ordering::Relaxed)
    }
}

impl Drop for TcpLinesTransport {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

/// Connect, pump, reconnect with backoff. Runs until aborted.
async fn read_upstream(
    address: String,
    buffer: Arc<IngestBuffer<Envelope>>,
    events: Arc<AtomicU64>,
    retry: RetryConfig,
) {
    let mut backoff = Backoff::new(retry);

    loop {
        match TcpStream::connect(&address).await {
            Ok(stream) => {
                backoff.reset();
                tracing::info!("Connected to upstream {}", address);
                match pump_lines(stream, &buffer, &events).await {
                    Ok(count) => tracing::info!("Upstream {} closed after {} envelopes", address, count),
                    Err(e) => tracing::warn!("Upstream {} read failed: {}", address, e),
                }
            },
            Err(e) => tracing::warn!("Failed to connect to upstream {}: {}", address, e),
        }

        let delay = backoff.next_delay();
        tracing::debug!("Reconnecting to {} in {:?} (attempt {})", address, delay, backoff.attempts());
        tokio::time::sleep(delay).await;
    }
}

/// Decode one JSON envelope per line into `buffer`.
///
/// Undecodable lines are logged and skipped. Returns the number of envelopes
/// delivered once the reader reaches end of stream.
pub async fn pump_lines<R>(reader: R, buffer: &IngestBuffer<Envelope>, events: &AtomicU64) -> Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    let mut delivered = 0;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        match decode_envelope(&line) {
            Ok(envelope) => {
                buffer.set(envelope);
                events.fetch_add(1, Ordering::Relaxed);
                delivered += 1;
            },
            Err(e) => tracing::warn!("Skipping envelope: {}", e),
        }
    }

    Ok(delivered)
}

pub fn decode_envelope(line: &str) -> Result<Envelope> {
    serde_json::from_str(line).map_err(|e| NozzleError::decode(e.to_string()))
}

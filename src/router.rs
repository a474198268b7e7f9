//! Single-worker dispatch from the ingest buffer to accumulators.
//!
//! The router polls the buffer without blocking. Each envelope is classified
//! and handed synchronously to every interested accumulator, so a slow
//! accumulator slows the router. Consecutive empty polls are counted; once
//! the upstream has been silent for the restart threshold the transport is
//! told to reconnect.

use crate::accumulators::Accumulator;
use crate::core::{Envelope, StreamKey};
use crate::receiver::{IngestBuffer, Transport};
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Sleep after an empty poll.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// ValueMetric has two interested accumulators, every other stream one.
type Targets = SmallVec<[Arc<dyn Accumulator>; 2]>;

/// Empty polls per second of silence.
const POLLS_PER_SECOND: u64 = 2;

/// Outcome of one poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Poll {
    /// An envelope was delivered to this many accumulators.
    Routed(StreamKey, usize),
    /// The buffer was empty.
    Empty,
    /// The buffer was empty and the stall limit was reached.
    Restarted,
}

/// Router counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct RouterStats {
    pub routed: u64,
    pub unrouted: u64,
    pub empty_polls: u64,
    pub restarts: u64,
}

pub struct Router {
    buffer: Arc<IngestBuffer<Envelope>>,
    routes: HashMap<StreamKey, Targets>,
    transport: Arc<dyn Transport>,
    stall_limit: u64,
    empty_polls: AtomicU64,
    routed: AtomicU64,
    unrouted: AtomicU64,
    restarts: AtomicU64,
    stop: Mutex<Option<oneshot::Sender<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Router {
    /// Build routes for every accumulator stream that is also enabled.
    pub fn new(
        buffer: Arc<IngestBuffer<Envelope>>,
        accumulators: &[Arc<dyn Accumulator>],
        enabled: &BTreeSet<StreamKey>,
        transport: Arc<dyn Transport>,
        restart_threshold_secs: u64,
    ) -> Self {
        let mut routes: HashMap<StreamKey, Targets> = HashMap::new();
        for accumulator in accumulators {
            for stream in accumulator.streams() {
                if enabled.contains(stream) {
                    routes.entry(*stream).or_default().push(Arc::clone(accumulator));
                }
            }
        }

        for (stream, targets) in &routes {
            let names: Vec<_> = targets.iter().map(|a| a.name()).collect();
            tracing::debug!("Routing {} to {:?}", stream, names);
        }

        Self {
            buffer,
            routes,
            transport,
            stall_limit: restart_threshold_secs.saturating_mul(POLLS_PER_SECOND).max(1),
            empty_polls: AtomicU64::new(0),
            routed: AtomicU64::new(0),
            unrouted: AtomicU64::new(0),
            restarts: AtomicU64::new(0),
            stop: Mutex::new(None),
            worker: Mutex::new(None),
        }
    }

    /// Accumulators interested in `stream`.
    pub fn targets(&self, stream: StreamKey) -> usize {
        self.routes.get(&stream).map_or(0, SmallVec::len)
    }

    /// Deliver one envelope to every interested accumulator.
    pub fn route(&self, envelope: &Envelope) -> (StreamKey, usize) {
        let stream = envelope.stream_key();
        let Some(targets) = self.routes.get(&stream) else {
            self.unrouted.fetch_add(1, Ordering::Relaxed);
            return (stream, 0);
        };
        for accumulator in targets {
            accumulator.update(envelope);
        }
        self.routed.fetch_add(1, Ordering::Relaxed);
        (stream, targets.len())
    }

    /// Take at most one envelope from the buffer and route it. Never blocks.
    pub fn poll_once(&self) -> Poll {
        if let Some(envelope) = self.buffer.try_next() {
            self.empty_polls.store(0, Ordering::Relaxed);
            let (stream, delivered) = self.route(&envelope);
            tracing::trace!("Routed {} to {} accumulators", stream, delivered);
            return Poll::Routed(stream, delivered);
        }

        let empty = self.empty_polls.fetch_add(1, Ordering::Relaxed) + 1;
        if empty >= self.stall_limit {
            self.empty_polls.store(0, Ordering::Relaxed);
            self.restarts.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                "Ingest buffer empty for {} polls, restarting upstream transport",
                empty
            );
            self.transport.restart();
            return Poll::Restarted;
        }
        Poll::Empty
    }

    /// Spawn the poll loop on the current tokio runtime.
    pub fn start(self: &Arc<Self>) {
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let router = Arc::clone(self);

        let worker = tokio::spawn(async move {
            tracing::info!("Router started");
            loop {
                match router.poll_once() {
                    Poll::Routed(..) => {
                        if !matches!(stop_rx.try_recv(), Err(oneshot::error::TryRecvError::Empty)) {
                            break;
                        }
                        tokio::task::yield_now().await;
                    },
                    Poll::Empty | Poll::Restarted => {
                        tokio::select! {
                            _ = &mut stop_rx => break,
                            _ = tokio::time::sleep(POLL_INTERVAL) => {},
                        }
                    },
                }
            }
            tracing::info!("Router stopped");
        });

        if let Some(previous) = self.stop.lock().replace(stop_tx) {
            let _ = previous.send(());
        }
        if let Some(previous) = self.worker.lock().replace(worker) {
            previous.abort();
        }
    }

    /// Stop the poll loop and wait for it to exit. Idempotent.
    pub async fn close(&self) {
        if let Some(stop) = self.stop.lock().take() {
            let _ = stop.send(());
        }
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                if !e.is_cancelled() {
                    tracing::error!("Router worker failed: {}", e);
                }
            }
        }
    }

    pub fn stats(&self) -> RouterStats {
        RouterStats {
            routed: self.routed.load(Ordering::Relaxed),
            unrouted: self.unrouted.load(Ordering::Relaxed),
            empty_polls: self.empty_polls.load(Ordering::Relaxed),
            restarts: self.restarts.load(Ordering::Relaxed),
        }
    }
}

//! Periodic drain-and-export cycle.

use crate::accumulators::Accumulator;
use crate::export::ClientManager;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Summary of one harvest pass.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct HarvestReport {
    pub entities: usize,
    pub metrics: usize,
    pub exported: usize,
    pub finished_at: DateTime<Utc>,
}

pub struct Harvester {
    accumulators: Vec<Arc<dyn Accumulator>>,
    exporter: Arc<ClientManager>,
    interval: Duration,
    last: Mutex<Option<HarvestReport>>,
    stop: Mutex<Option<oneshot::Sender<()>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Harvester {
    pub fn new(accumulators: Vec<Arc<dyn Accumulator>>, exporter: Arc<ClientManager>, interval: Duration) -> Self {
        Self {
            accumulators,
            exporter,
            interval,
            last: Mutex::new(None),
            stop: Mutex::new(None),
            worker: Mutex::new(None),
        }
    }

    /// Drain every accumulator, finalize every metric, then flush all clients.
    pub async fn harvest(&self) -> HarvestReport {
        let mut entities = 0;
        let mut metrics = 0;

        for accumulator in &self.accumulators {
            let drained = accumulator.drain();
            entities += drained.len();
            for entity in drained {
                for metric in entity.drain_metrics() {
                    metrics += 1;
                    accumulator.harvest_metric(&entity, metric);
                }
            }
            tracing::debug!("Drained {}", accumulator.name());
        }

        let exported = self.exporter.flush_all().await;
        let report = HarvestReport {
            entities,
            metrics,
            exported,
            finished_at: Utc::now(),
        };
        tracing::info!(
            "Harvest complete: {} entities, {} metrics, {} events exported",
            report.entities,
            report.metrics,
            report.exported
        );
        *self.last.lock() = Some(report.clone());
        report
    }

    pub fn last_report(&self) -> Option<HarvestReport> {
        self.last.lock().clone()
    }

    /// Harvest on a fixed interval until closed. The first pass runs one
    /// interval after start.
    pub fn start(self: &Arc<Self>) {
        let (stop_tx, mut stop_rx) = oneshot::channel();
        let harvester = Arc::clone(self);

        let worker = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + harvester.interval, harvester.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            tracing::info!("Harvester started, interval {:?}", harvester.interval);
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        harvester.harvest().await;
                    },
                }
            }
            tracing::info!("Harvester stopped");
        });

        if let Some(previous) = self.stop.lock().replace(stop_tx) {
            let _ = previous.send(());
        }
        if let Some(previous) = self.worker.lock().replace(worker) {
            previous.abort();
        }
    }

    /// Stop the ticker, letting an in-flight harvest finish. Idempotent.
    pub async fn close(&self) {
        if let Some(stop) = self.stop.lock().take() {
            let _ = stop.send(());
        }
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                if !e.is_cancelled() {
                    tracing::error!("Harvester worker failed: {}", e);
                }
            }
        }
    }
}

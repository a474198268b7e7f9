//! Wiring of the whole pipeline and ordered shutdown.

use crate::accumulators::{self, Accumulator};
use crate::core::{AppContext, Config, Envelope, Result};
use crate::export::{ClientManager, Credentials, EventSink, StdoutSink};
use crate::harvester::Harvester;
use crate::health::{self, HealthState};
use crate::metadata::{AppMetadata, PlaceholderMetadata};
use crate::receiver::{IngestBuffer, TcpLinesTransport, Transport};
use crate::router::Router;
use std::sync::Arc;

/// Main application struct that owns every pipeline stage.
pub struct Application {
    ctx: Arc<AppContext>,
    buffer: Arc<IngestBuffer<Envelope>>,
    transport: Arc<dyn Transport>,
    router: Arc<Router>,
    harvester: Arc<Harvester>,
    accumulators: Vec<Arc<dyn Accumulator>>,
}

impl Application {
    /// Application that exports to stdout with placeholder app metadata.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_collaborators(config, Arc::new(PlaceholderMetadata), Arc::new(StdoutSink))
    }

    /// Wire the pipeline around the given metadata cache and export sink.
    ///
    /// The upstream transport is created but not started.
    pub fn with_collaborators(
        config: Config,
        metadata: Arc<dyn AppMetadata>,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self> {
        config.validate()?;
        let enabled = config.enabled_streams()?;

        let exporter = Arc::new(ClientManager::new(Credentials::from_config(&config.export), sink));
        let ctx = Arc::new(AppContext::new(config, metadata, Arc::clone(&exporter)));

        let buffer = Arc::new(IngestBuffer::with_alert(ctx.config.firehose.buffer_capacity, |dropped| {
            tracing::warn!("Ingest buffer full, dropped {} oldest envelope(s)", dropped);
        }));

        let transport: Arc<dyn Transport> = Arc::new(TcpLinesTransport::new(
            ctx.config.firehose.upstream_address.clone(),
            Arc::clone(&buffer),
        ));

        let accumulators = accumulators::build_all(&ctx);
        let router = Arc::new(Router::new(
            Arc::clone(&buffer),
            &accumulators,
            &enabled,
            Arc::clone(&transport),
            ctx.config.firehose.restart_threshold_secs,
        ));
        let harvester = Arc::new(Harvester::new(
            accumulators.clone(),
            exporter,
            ctx.config.harvest.interval,
        ));

        Ok(Self {
            ctx,
            buffer,
            transport,
            router,
            harvester,
            accumulators,
        })
    }

    /// Run until ctrl-c, then shut down in order.
    pub async fn run(self) -> Result<()> {
        tracing::info!(
            "Starting nozzle subscription {} with {} accumulators",
            self.ctx.config.firehose.subscription_id,
            self.accumulators.len()
        );

        let listener = if self.ctx.config.health.enabled {
            Some(health::bind(self.ctx.config.health.port).await?)
        } else {
            None
        };

        self.start()?;

        let health_task = listener.map(|listener| {
            let state = self.health_state();
            tokio::spawn(async move {
                if let Err(e) = health::serve(listener, state).await {
                    tracing::error!("{}", e);
                }
            })
        });

        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
        }
        tracing::info!("Received shutdown signal, stopping...");

        self.shutdown().await;
        if let Some(task) = health_task {
            task.abort();
        }
        Ok(())
    }

    /// Start the transport, router and harvester without blocking.
    pub fn start(&self) -> Result<()> {
        self.transport.start()?;
        self.router.start();
        self.harvester.start();
        Ok(())
    }

    /// Close the transport, then the router, then the harvester, then flush
    /// whatever was enqueued in between.
    pub async fn shutdown(&self) {
        self.transport.close();
        self.router.close().await;
        self.harvester.close().await;
        let flushed = self.ctx.exporter.flush_all().await;
        tracing::info!("Shutdown complete, {} events flushed", flushed);
    }

    pub fn health_state(&self) -> HealthState {
        HealthState {
            buffer: Arc::clone(&self.buffer),
            router: Arc::clone(&self.router),
            transport: Arc::clone(&self.transport),
            harvester: Arc::clone(&self.harvester),
            exporter: Arc::clone(&self.ctx.exporter),
        }
    }

    pub fn context(&self) -> &Arc<AppContext> {
        &self.ctx
    }

    pub fn buffer(&self) -> &Arc<IngestBuffer<Envelope>> {
        &self.buffer
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn harvester(&self) -> &Arc<Harvester> {
        &self.harvester
    }

    pub fn accumulators(&self) -> &[Arc<dyn Accumulator>] {
        &self.accumulators
    }
}

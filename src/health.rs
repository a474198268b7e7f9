//! Liveness and pipeline counters over HTTP.

use crate::core::{Envelope, NozzleError, Result};
use crate::export::{ClientManager, ExportStats};
use crate::harvester::{HarvestReport, Harvester};
use crate::receiver::{BufferStats, IngestBuffer, Transport};
use crate::router::{Router as EnvelopeRouter, RouterStats};
use axum::{extract::State, response::Json, routing::get, Router};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

pub const ALIVE: &str = "I'm alive and well!";

/// Handles to every pipeline stage the stats endpoint reports on.
#[derive(Clone)]
pub struct HealthState {
    pub buffer: Arc<IngestBuffer<Envelope>>,
    pub router: Arc<EnvelopeRouter>,
    pub transport: Arc<dyn Transport>,
    pub harvester: Arc<Harvester>,
    pub exporter: Arc<ClientManager>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub version: &'static str,
    pub buffer: BufferStats,
    pub router: RouterStats,
    pub transport_events: u64,
    pub transport_restarts: u64,
    pub export: ExportStats,
    pub last_harvest: Option<HarvestReport>,
}

impl HealthState {
    pub fn stats(&self) -> StatsResponse {
        StatsResponse {
            version: env!("CARGO_PKG_VERSION"),
            buffer: self.buffer.stats(),
            router: self.router.stats(),
            transport_events: self.transport.event_count(),
            transport_restarts: self.transport.restarts(),
            export: self.exporter.stats(),
            last_harvest: self.harvester.last_report(),
        }
    }
}

pub fn routes(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/stats", get(stats_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `0.0.0.0:port`.
pub async fn bind(port: u16) -> Result<TcpListener> {
    let addr = format!("0.0.0.0:{}", port);
    TcpListener::bind(&addr)
        .await
        .map_err(|e| NozzleError::network(format!("Failed to bind health endpoint to {}: {}", addr, e)))
}

/// Serve until the listener fails.
pub async fn serve(listener: TcpListener, state: HealthState) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Health endpoint listening on http://{}", addr);
    }
    axum::serve(listener, routes(state))
        .await
        .map_err(|e| NozzleError::network(format!("Health server error: {}", e)))
}

async fn health_handler() -> &'static str {
    ALIVE
}

async fn stats_handler(State(state): State<HealthState>) -> Json<StatsResponse> {
    Json(state.stats())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accumulators::Accumulator;
    use crate::core::types::Counter;
    use crate::core::{Message, StreamKey};
    use crate::export::{Credentials, MemorySink};
    use crate::receiver::TcpLinesTransport;
    use std::collections::BTreeSet;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn state() -> HealthState {
        let buffer = Arc::new(IngestBuffer::new(4));
        let transport: Arc<dyn Transport> = Arc::new(TcpLinesTransport::new("127.0.0.1:1", Arc::clone(&buffer)));
        let exporter = Arc::new(ClientManager::new(Credentials::default(), Arc::new(MemorySink::new())));
        let accumulators: Vec<Arc<dyn Accumulator>> = Vec::new();
        let enabled: BTreeSet<StreamKey> = StreamKey::ALL.iter().copied().collect();
        let router = Arc::new(EnvelopeRouter::new(
            Arc::clone(&buffer),
            &accumulators,
            &enabled,
            Arc::clone(&transport),
            15,
        ));
        let harvester = Arc::new(Harvester::new(accumulators, Arc::clone(&exporter), Duration::from_secs(60)));
        HealthState {
            buffer,
            router,
            transport,
            harvester,
            exporter,
        }
    }

    async fn get(port: u16, path: &str) -> String {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let request = format!("GET {} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n", path);
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[test]
    fn test_stats_snapshot() {
        let state = state();
        state.buffer.set(Envelope::new(Message::Counter(Counter::default())));
        let stats = state.stats();
        assert_eq!(stats.buffer.received, 1);
        assert_eq!(stats.router.routed, 0);
        assert!(stats.last_harvest.is_none());
    }

    #[tokio::test]
    async fn test_health_and_stats_endpoints() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(serve(listener, state()));

        let health = get(port, "/health").await;
        assert!(health.starts_with("HTTP/1.1 200"));
        assert!(health.ends_with(ALIVE));

        let stats = get(port, "/stats").await;
        assert!(stats.starts_with("HTTP/1.1 200"));
        assert!(stats.contains("\"transport_restarts\":0"));
        assert!(stats.contains("\"last_harvest\":null"));

        server.abort();
    }
}

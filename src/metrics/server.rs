//! HTTP server for the Prometheus scrape endpoint.

use crate::metrics::{MetricsRegistry, MetricsSnapshot};
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tower_http::cors::CorsLayer;

/// Failure to bring up or keep serving the exporter.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("metrics listener: {0}")]
    Bind(#[from] std::io::Error),

    #[error("metrics server stopped: {0}")]
    Server(String),
}

#[derive(Debug, Clone)]
pub struct MetricsServerConfig {
    /// Listen address. All interfaces by default.
    pub bind_addr: SocketAddr,
}

impl Default for MetricsServerConfig {
    fn default() -> Self {
        Self::with_port(9090)
    }
}

impl MetricsServerConfig {
    pub fn with_port(port: u16) -> Self {
        Self {
            bind_addr: ([0, 0, 0, 0], port).into(),
        }
    }
}

type SnapshotSource = dyn Fn() -> MetricsSnapshot + Send + Sync;

/// Registry plus the function that samples the pipeline on every scrape.
#[derive(Clone)]
struct ScrapeState {
    registry: Arc<MetricsRegistry>,
    source: Arc<SnapshotSource>,
}

impl ScrapeState {
    fn render(&self) -> Result<String, super::MetricsError> {
        self.registry.update(&(self.source)());
        self.registry.encode()
    }
}

/// Serves `/metrics` and `/health`.
///
/// Values are pulled from the snapshot source at scrape time, so nothing has
/// to push updates between scrapes.
pub struct MetricsServer {
    config: MetricsServerConfig,
    state: ScrapeState,
}

impl MetricsServer {
    pub fn new<F>(config: MetricsServerConfig, registry: MetricsRegistry, source: F) -> Self
    where
        F: Fn() -> MetricsSnapshot + Send + Sync + 'static,
    {
        Self {
            config,
            state: ScrapeState {
                registry: Arc::new(registry),
                source: Arc::new(source),
            },
        }
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/health", get(health_handler))
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Runs until `shutdown` resolves.
    pub async fn run(
        self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), ServerError> {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;

        tracing::info!(addr = %self.config.bind_addr, "Metrics server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Server(e.to_string()))
    }
}

async fn metrics_handler(State(state): State<ScrapeState>) -> impl IntoResponse {
    match state.render() {
        Ok(output) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            output,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("scrape failed: {e}"),
        ),
    }
}

async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

//! Health server for Kubernetes probes and Prometheus metrics
//!
//! Provides HTTP endpoints for:
//! - `/healthz` - Liveness probe (is the process alive?)
//! - `/readyz` - Readiness probe (has the watcher completed a pass?)
//! - `/metrics` - Prometheus metrics

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;
use tokio::net::TcpListener;
use tokio::sync::RwLock;

/// Labels for the per-state namespace gauge
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct StateLabels {
    pub state: String,
}

impl prometheus_client::encoding::EncodeLabelSet for StateLabels {
    fn encode(
        &self,
        mut encoder: prometheus_client::encoding::LabelSetEncoder,
    ) -> Result<(), std::fmt::Error> {
        use prometheus_client::encoding::EncodeLabel;
        ("state", self.state.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Shared metrics state
pub struct Metrics {
    /// Seconds since the process started
    pub uptime_seconds: Gauge,
    /// Namespaces enqueued during the latest inventory pass
    pub watchlist_length: Gauge,
    /// Opted-in namespaces by desired state
    pub namespaces: Family<StateLabels, Gauge>,

    /// Prometheus registry
    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let uptime_seconds = Gauge::default();
        registry.register(
            "ns_suspender_uptime_seconds",
            "Seconds since the suspender started",
            uptime_seconds.clone(),
        );

        let watchlist_length = Gauge::default();
        registry.register(
            "ns_suspender_watchlist_length",
            "Number of namespaces enqueued during the latest inventory pass",
            watchlist_length.clone(),
        );

        let namespaces = Family::<StateLabels, Gauge>::default();
        registry.register(
            "ns_suspender_namespaces",
            "Number of opted-in namespaces by desired state",
            namespaces.clone(),
        );

        Self {
            uptime_seconds,
            watchlist_length,
            namespaces,
            registry,
        }
    }

    /// Publish the tallies of one watcher pass.
    pub fn record_pass(&self, enqueued: i64, running: i64, suspended: i64, unknown: i64) {
        self.watchlist_length.set(enqueued);
        self.set_namespaces("Running", running);
        self.set_namespaces("Suspended", suspended);
        self.set_namespaces("Unknown", unknown);
    }

    fn set_namespaces(&self, state: &str, count: i64) {
        let labels = StateLabels {
            state: state.to_string(),
        };
        self.namespaces.get_or_create(&labels).set(count);
    }

    /// Encode metrics to Prometheus text format
    ///
    /// Returns an empty string if encoding fails (should never happen with valid metrics).
    fn encode(&self) -> String {
        let mut buffer = String::new();
        if let Err(e) = encode(&mut buffer, &self.registry) {
            tracing::error!("Failed to encode metrics: {}", e);
            return String::new();
        }
        buffer
    }
}

/// Shared state for the health server
pub struct HealthState {
    /// Whether the watcher has completed an inventory pass
    pub ready: RwLock<bool>,
    /// Metrics registry
    pub metrics: Metrics,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    pub fn new() -> Self {
        Self {
            ready: RwLock::new(false),
            metrics: Metrics::new(),
        }
    }

    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    pub async fn is_ready(&self) -> bool {
        *self.ready.read().await
    }
}

/// Keep the uptime gauge current until cancelled externally.
pub async fn run_uptime_counter(state: Arc<HealthState>) {
    let started = Instant::now();
    loop {
        state
            .metrics
            .uptime_seconds
            .set(started.elapsed().as_secs() as i64);
        tokio::time::sleep(Duration::from_secs(5)).await;
    }
}

/// Liveness probe handler
async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness probe handler
async fn readyz(State(state): State<Arc<HealthState>>) -> Response {
    if state.is_ready().await {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}

/// Metrics handler
async fn metrics(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let body = state.metrics.encode();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// Create the health server router
pub fn create_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Run the health server
///
/// Binds to 0.0.0.0:8080 and serves health/metrics endpoints.
pub async fn run_health_server(state: Arc<HealthState>) -> Result<(), std::io::Error> {
    let app = create_router(state);

    let listener = TcpListener::bind("0.0.0.0:8080").await?;
    tracing::info!("Health server listening on 0.0.0.0:8080");

    axum::serve(listener, app).await
}

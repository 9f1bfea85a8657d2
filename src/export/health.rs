use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::metrics::ExecutionProfile;

const NAMESPACE: &str = "jfr_metrics";

/// Prometheus metrics for agent health and observability.
///
/// Owns the registry that handler instruments are created in, so one
/// scrape of `/metrics` returns both. Agent metrics use the "jfr_metrics"
/// namespace.
pub struct HealthMetrics {
    registry: Registry,
    addr: String,
    shutdown: parking_lot::Mutex<Option<CancellationToken>>,

    /// Total lines read from the event source.
    pub events_received: Counter,
    /// Events whose type no handler supports.
    pub events_ignored: Counter,
    /// Lines that failed to parse.
    pub events_malformed: Counter,
    /// Events routed to at least one handler, by event type.
    pub events_by_type: CounterVec,
    /// Number of active handlers.
    pub handlers_active: Gauge,
    /// Per-event dispatch duration (1us-5ms buckets).
    pub event_dispatch_duration: Histogram,
}

impl HealthMetrics {
    /// Creates a new health metrics instance with all metrics registered.
    pub fn new(addr: &str) -> Result<Self> {
        let registry = Registry::new();

        let events_received = Counter::with_opts(
            Opts::new(
                "events_received_total",
                "Total events read from the event source.",
            )
            .namespace(NAMESPACE),
        )?;
        let events_ignored = Counter::with_opts(
            Opts::new(
                "events_ignored_total",
                "Total events with a type no handler supports.",
            )
            .namespace(NAMESPACE),
        )?;
        let events_malformed = Counter::with_opts(
            Opts::new(
                "events_malformed_total",
                "Total event lines that could not be parsed.",
            )
            .namespace(NAMESPACE),
        )?;
        let events_by_type = CounterVec::new(
            Opts::new(
                "events_by_type_total",
                "Total events dispatched by event type.",
            )
            .namespace(NAMESPACE),
            &["event_type"],
        )?;
        let handlers_active = Gauge::with_opts(
            Opts::new("handlers_active", "Number of active event handlers.").namespace(NAMESPACE),
        )?;
        let event_dispatch_duration = Histogram::with_opts(
            HistogramOpts::new(
                "event_dispatch_duration_seconds",
                "Time to dispatch a single event to its handlers.",
            )
            .namespace(NAMESPACE)
            .buckets(vec![0.000001, 0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005]),
        )?;

        registry.register(Box::new(events_received.clone()))?;
        registry.register(Box::new(events_ignored.clone()))?;
        registry.register(Box::new(events_malformed.clone()))?;
        registry.register(Box::new(events_by_type.clone()))?;
        registry.register(Box::new(handlers_active.clone()))?;
        registry.register(Box::new(event_dispatch_duration.clone()))?;

        Ok(Self {
            registry,
            addr: addr.to_string(),
            shutdown: parking_lot::Mutex::new(None),
            events_received,
            events_ignored,
            events_malformed,
            events_by_type,
            handlers_active,
            event_dispatch_duration,
        })
    }

    /// The registry handler instruments should be created in.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Renders the registry in the Prometheus text format.
    pub fn encode(&self) -> Result<String> {
        encode_registry(&self.registry)
    }

    /// Starts the HTTP server serving /metrics, /healthz and /debug/profile.
    ///
    /// Returns the bound address.
    pub async fn start(&self, profile: Arc<ExecutionProfile>) -> Result<SocketAddr> {
        let registry = self.registry.clone();
        let app_state = Arc::new(AppState { registry, profile });

        let app = Router::new()
            .route("/metrics", get(metrics_handler))
            .route("/healthz", get(healthz_handler))
            .route("/debug/profile", get(profile_handler))
            .with_state(app_state);

        let listener = TcpListener::bind(&self.addr)
            .await
            .with_context(|| format!("listening on {}", self.addr))?;

        let local_addr = listener.local_addr().context("getting local address")?;

        let cancel = CancellationToken::new();
        *self.shutdown.lock() = Some(cancel.clone());

        tokio::spawn(async move {
            tracing::info!(addr = %local_addr, "metrics server started");

            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    cancel.cancelled().await;
                })
                .await;

            if let Err(e) = result {
                tracing::error!(error = %e, "metrics server error");
            }
        });

        Ok(local_addr)
    }

    /// Gracefully shuts down the metrics server.
    pub fn stop(&self) {
        if let Some(cancel) = self.shutdown.lock().take() {
            cancel.cancel();
        }
    }
}

fn encode_registry(registry: &Registry) -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .context("encoding metrics")?;

    String::from_utf8(buffer).context("converting metrics to string")
}

/// Shared state for axum handlers.
struct AppState {
    registry: Registry,
    profile: Arc<ExecutionProfile>,
}

/// GET /metrics - Prometheus text format.
async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match encode_registry(&state.registry) {
        Ok(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            text,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "encoding metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, "encoding error").into_response()
        }
    }
}

/// GET /healthz - Simple health check.
async fn healthz_handler() -> &'static str {
    "ok"
}

/// GET /debug/profile - folded method-sample stacks.
async fn profile_handler(State(state): State<Arc<AppState>>) -> String {
    state.profile.render()
}

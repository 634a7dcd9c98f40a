//! Health server for liveness/readiness probes and Prometheus metrics.
//!
//! Provides:
//! - `/healthz` - Liveness probe (always returns 200 if server is running)
//! - `/readyz` - Readiness probe (returns 200 once the engine is started)
//! - `/metrics` - Prometheus metrics endpoint

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabel, EncodeLabelSet, LabelSetEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use tokio::sync::RwLock;
use tracing::info;

use crate::model::{Cloud, ClusterStatus, Distribution};

/// Labels for cluster creation counts
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ClusterLabels {
    pub cloud: String,
    pub distribution: String,
    pub location: String,
}

impl EncodeLabelSet for ClusterLabels {
    fn encode(&self, encoder: &mut LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("cloud", self.cloud.as_str()).encode(encoder.encode_label())?;
        ("distribution", self.distribution.as_str()).encode(encoder.encode_label())?;
        ("location", self.location.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for status transitions
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct TransitionLabels {
    pub from: String,
    pub to: String,
}

impl EncodeLabelSet for TransitionLabels {
    fn encode(&self, encoder: &mut LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("from", self.from.as_str()).encode(encoder.encode_label())?;
        ("to", self.to.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for the time it takes a cluster to reach a status
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct StatusDurationLabels {
    pub cloud: String,
    pub location: String,
    pub status: String,
}

impl EncodeLabelSet for StatusDurationLabels {
    fn encode(&self, encoder: &mut LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("cloud", self.cloud.as_str()).encode(encoder.encode_label())?;
        ("location", self.location.as_str()).encode(encoder.encode_label())?;
        ("status", self.status.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for workflow failures
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct WorkflowLabels {
    pub workflow: String,
}

impl EncodeLabelSet for WorkflowLabels {
    fn encode(&self, encoder: &mut LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("workflow", self.workflow.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Shared metrics for the lifecycle engine
pub struct Metrics {
    /// Clusters accepted for creation
    pub clusters_created_total: Family<ClusterLabels, Counter>,
    /// Status changes written to clusters
    pub status_transitions_total: Family<TransitionLabels, Counter>,
    /// Seconds from request to target status
    pub status_duration_seconds: Family<StatusDurationLabels, Histogram>,
    /// Deletions started by the TTL controller
    pub ttl_deletions_total: Counter,
    /// Workflow runs that ended with an error
    pub workflow_failures_total: Family<WorkflowLabels, Counter>,
    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create a new metrics instance with registered metrics
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let clusters_created_total = Family::<ClusterLabels, Counter>::default();
        registry.register(
            "lifecycle_clusters_created",
            "Total number of clusters accepted for creation",
            clusters_created_total.clone(),
        );

        let status_transitions_total = Family::<TransitionLabels, Counter>::default();
        registry.register(
            "lifecycle_cluster_status_transitions",
            "Total number of cluster status transitions",
            status_transitions_total.clone(),
        );

        // 10s .. ~45h
        let status_duration_seconds =
            Family::<StatusDurationLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(10.0, 2.0, 15))
            });
        registry.register(
            "lifecycle_cluster_status_duration_seconds",
            "Time for a cluster to reach its target status",
            status_duration_seconds.clone(),
        );

        let ttl_deletions_total = Counter::default();
        registry.register(
            "lifecycle_ttl_deletions",
            "Total number of deletions started because a cluster TTL expired",
            ttl_deletions_total.clone(),
        );

        let workflow_failures_total = Family::<WorkflowLabels, Counter>::default();
        registry.register(
            "lifecycle_workflow_failures",
            "Total number of failed workflow runs",
            workflow_failures_total.clone(),
        );

        Self {
            clusters_created_total,
            status_transitions_total,
            status_duration_seconds,
            ttl_deletions_total,
            workflow_failures_total,
            registry,
        }
    }

    pub fn record_cluster_created(&self, cloud: Cloud, distribution: Distribution, location: &str) {
        let labels = ClusterLabels {
            cloud: cloud.to_string(),
            distribution: distribution.to_string(),
            location: location.to_string(),
        };
        self.clusters_created_total.get_or_create(&labels).inc();
    }

    pub fn record_transition(&self, from: ClusterStatus, to: ClusterStatus) {
        let labels = TransitionLabels {
            from: from.to_string(),
            to: to.to_string(),
        };
        self.status_transitions_total.get_or_create(&labels).inc();
    }

    pub fn record_ttl_deletion(&self) {
        self.ttl_deletions_total.inc();
    }

    pub fn record_workflow_failure(&self, workflow: &str) {
        let labels = WorkflowLabels {
            workflow: workflow.to_string(),
        };
        self.workflow_failures_total.get_or_create(&labels).inc();
    }

    /// Encode metrics to Prometheus text format
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if encode(&mut buffer, &self.registry).is_err() {
            tracing::error!("Failed to encode metrics");
            return "# Error encoding metrics".to_string();
        }
        buffer
    }
}

/// Measures how long a cluster takes to reach a status
pub struct StatusChangeTimer {
    labels: StatusDurationLabels,
    started: Instant,
}

impl StatusChangeTimer {
    pub fn start(cloud: Cloud, location: &str, target: ClusterStatus) -> Self {
        Self {
            labels: StatusDurationLabels {
                cloud: cloud.to_string(),
                location: location.to_string(),
                status: target.to_string(),
            },
            started: Instant::now(),
        }
    }

    /// Record the elapsed time
    pub fn observe(self, metrics: &Metrics) {
        metrics
            .status_duration_seconds
            .get_or_create(&self.labels)
            .observe(self.started.elapsed().as_secs_f64());
    }
}

/// Shared state for the health server
pub struct HealthState {
    ready: RwLock<bool>,
    /// Metrics registry
    pub metrics: Metrics,
    /// Last completed TTL pass (Unix epoch seconds)
    pub last_ttl_check: AtomicU64,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Create a new health state (starts as not ready)
    pub fn new() -> Self {
        Self {
            ready: RwLock::new(false),
            metrics: Metrics::new(),
            last_ttl_check: AtomicU64::new(0),
        }
    }

    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    pub async fn is_ready(&self) -> bool {
        *self.ready.read().await
    }

    pub fn touch_ttl_check(&self) {
        let now = jiff::Timestamp::now().as_second().max(0) as u64;
        self.last_ttl_check.store(now, Ordering::Relaxed);
    }
}

/// Liveness probe handler
async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness probe handler
///
/// Returns 503 Service Unavailable until the engine marks itself ready.
async fn readyz(State(state): State<Arc<HealthState>>) -> Response {
    if state.is_ready().await {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}

async fn metrics_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
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
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Run the health server on all interfaces
pub async fn run_health_server(state: Arc<HealthState>, port: u16) -> Result<(), std::io::Error> {
    let app = create_router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!(port, "Starting health server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

//! Deletes clusters whose time to live has elapsed.
//!
//! Every known cluster is enqueued on start, and created or updated clusters
//! are enqueued as events arrive. A single worker evaluates one cluster at a
//! time: expired clusters get a regular (non-forced) deletion, clusters that
//! have not expired yet are checked again after the recheck interval.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use jiff::{SignedDuration, Timestamp};
#[cfg(test)]
use mockall::automock;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::config::TtlConfig;
use crate::controller::error::Result;
use crate::controller::events::{ClusterEvent, ClusterEvents};
use crate::controller::workqueue::WorkQueue;
use crate::health::HealthState;
use crate::model::{Cluster, ClusterId, ClusterStatus};
use crate::store::ClusterRepository;

/// Outcome of evaluating a cluster's TTL
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TtlDecision {
    /// No TTL configured, or the cluster is not in a stable status
    Skip,
    Expired,
    NotYetExpired,
}

/// Decide whether a cluster is due for deletion at `now`
pub fn evaluate(cluster: &Cluster, now: Timestamp) -> TtlDecision {
    if cluster.ttl_minutes == 0 || !cluster.status.is_stable() {
        return TtlDecision::Skip;
    }

    let started = match cluster.started_at {
        Some(started) => started,
        None if cluster.status != ClusterStatus::Creating => cluster.created_at,
        None => return TtlDecision::Skip,
    };
    let ttl = SignedDuration::from_mins(i64::from(cluster.ttl_minutes));
    match started.checked_add(ttl) {
        Ok(expires) if now > expires => TtlDecision::Expired,
        Ok(_) => TtlDecision::NotYetExpired,
        // beyond the representable range, never expires
        Err(_) => TtlDecision::NotYetExpired,
    }
}

/// Starts deletion of an expired cluster
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterDeleter: Send + Sync {
    async fn delete_expired(&self, cluster: &Cluster) -> Result<()>;
}

enum Processed {
    Done,
    Recheck,
}

pub struct TtlController {
    repository: Arc<dyn ClusterRepository>,
    events: ClusterEvents,
    deleter: Arc<dyn ClusterDeleter>,
    recheck_interval: Duration,
    queue: Arc<WorkQueue<ClusterId>>,
    health_state: Option<Arc<HealthState>>,
}

impl TtlController {
    pub fn new(
        config: &TtlConfig,
        repository: Arc<dyn ClusterRepository>,
        events: ClusterEvents,
        deleter: Arc<dyn ClusterDeleter>,
        health_state: Option<Arc<HealthState>>,
    ) -> Self {
        Self {
            repository,
            events,
            deleter,
            recheck_interval: config.recheck_interval,
            queue: Arc::new(WorkQueue::new(
                config.retry_base_delay,
                config.retry_max_delay,
            )),
            health_state,
        }
    }

    /// Run until `shutdown` resolves
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> Result<()> {
        // subscribe first so clusters created while listing are not missed
        let mut events = self.events.subscribe();

        let clusters = self.repository.all().await?;
        info!(clusters = clusters.len(), "Starting TTL controller");
        for cluster in clusters {
            self.queue.add(cluster.id);
        }

        let queue = self.queue.clone();
        let forwarder = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(ClusterEvent::Created(id) | ClusterEvent::Updated(id)) => queue.add(id),
                    Ok(ClusterEvent::Deleted(_)) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "TTL controller missed cluster events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        tokio::select! {
            _ = shutdown => info!("TTL controller stopping"),
            _ = self.worker_loop() => {}
        }

        self.queue.shutdown();
        forwarder.abort();
        Ok(())
    }

    async fn worker_loop(&self) {
        while let Some(cluster_id) = self.queue.get().await {
            match self.process(cluster_id).await {
                Ok(Processed::Done) => self.queue.forget(&cluster_id),
                Ok(Processed::Recheck) => {
                    self.queue.forget(&cluster_id);
                    self.queue.add_after(cluster_id, self.recheck_interval);
                }
                Err(e) => {
                    warn!(
                        cluster_id,
                        error = %e,
                        requeues = self.queue.num_requeues(&cluster_id),
                        "TTL check failed, retrying"
                    );
                    self.queue.add_rate_limited(cluster_id);
                }
            }
            self.queue.done(&cluster_id);

            if let Some(state) = &self.health_state {
                state.touch_ttl_check();
            }
        }
    }

    async fn process(&self, cluster_id: ClusterId) -> Result<Processed> {
        let cluster = match self.repository.get(cluster_id).await {
            Ok(cluster) => cluster,
            Err(e) if e.is_not_found() => {
                debug!(cluster_id, "Cluster gone, dropping from TTL queue");
                return Ok(Processed::Done);
            }
            Err(e) => return Err(e),
        };

        match evaluate(&cluster, Timestamp::now()) {
            TtlDecision::Skip => Ok(Processed::Done),
            TtlDecision::NotYetExpired => Ok(Processed::Recheck),
            TtlDecision::Expired => {
                info!(
                    cluster_id,
                    organization_id = cluster.organization_id,
                    cluster = %cluster.name,
                    ttl_minutes = cluster.ttl_minutes,
                    "Cluster TTL expired, deleting"
                );
                self.deleter.delete_expired(&cluster).await?;
                if let Some(state) = &self.health_state {
                    state.metrics.record_ttl_deletion();
                }
                Ok(Processed::Done)
            }
        }
    }
}

//! Entry points for creating, updating and deleting clusters.
//!
//! Requests are validated and persisted synchronously. The long-running part
//! of a creation or update then runs on a spawned task so callers get the
//! entity back right away; failures on that task, panics included, end up
//! as an `Error` status on the cluster and are passed to the error handler.

mod create;
mod update;
pub mod validation;

pub use create::{ClusterCreator, CreationContext, StandardCreator};
pub use update::{
    ClusterUpdater, NodePoolUpdater, StandardUpdater, UpdateContext, label_descriptors,
};

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::cluster::{CommonCluster, Identity, KubeconfigProvider, Persistent, StatusTracker};
use crate::controller::context::Context;
use crate::controller::error::{Error, Result};
use crate::controller::events::ClusterEvent;
use crate::controller::ttl::ClusterDeleter;
use crate::health::StatusChangeTimer;
use crate::model::{Cluster, ClusterId, ClusterStatus, ClusterStatusView, OrganizationId};
use crate::proxy::{KubeApiProxy, ProxyCache};
use crate::secret::{SecretValidator, validate_secrets};
use crate::workflow::workflows::{DeleteClusterWorkflow, DeleteClusterWorkflowInput};
use crate::workflow::{StartWorkflowOptions, WorkflowClient, get_result, start_workflow};

/// Keep caller mistakes as they are and wrap anything else as invalid input
fn as_invalid_request(error: Error) -> Error {
    if error.is_client_error() {
        error
    } else {
        Error::InvalidRequest(error.to_string())
    }
}

/// Record a failed background operation on the cluster.
///
/// A cluster already in `Error` keeps the message written by the workflow.
async fn mark_failed(ctx: &Context, cluster_id: ClusterId, operation: &str, error: &Error) {
    let mut cluster = match ctx.load_cluster(cluster_id).await {
        Ok(cluster) => cluster,
        Err(e) => {
            warn!(cluster_id, error = %e, "Could not load cluster to record failure");
            return;
        }
    };
    if cluster.status() == ClusterStatus::Error {
        return;
    }
    let message = format!("{operation} failed: {}", error.root());
    if let Err(e) = cluster.set_status(ClusterStatus::Error, &message).await {
        warn!(cluster_id, error = %e, "Could not record failure on cluster");
    }
}

/// Run `work` off the caller's path
fn spawn_background<F>(
    ctx: Arc<Context>,
    cluster_id: ClusterId,
    organization_id: OrganizationId,
    operation: &'static str,
    work: F,
) -> JoinHandle<()>
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(async move {
        let error = match AssertUnwindSafe(work).catch_unwind().await {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e,
            Err(panic) => Error::from_panic(panic),
        };
        let error = error.with_cluster(cluster_id, organization_id);
        warn!(cluster_id, organization_id, operation, error = %error, "Background operation failed");
        mark_failed(&ctx, cluster_id, operation, &error).await;
        ctx.error_handler.handle(&error);
    })
}

/// Orchestrates cluster lifecycles
pub struct ClusterManager {
    ctx: Arc<Context>,
    workflows: Arc<dyn WorkflowClient>,
    validator: Arc<dyn SecretValidator>,
    proxies: Arc<ProxyCache>,
}

impl ClusterManager {
    pub fn new(
        ctx: Arc<Context>,
        workflows: Arc<dyn WorkflowClient>,
        validator: Arc<dyn SecretValidator>,
    ) -> Self {
        let proxies = Arc::new(ProxyCache::new(&ctx.config.proxy));
        Self {
            ctx,
            workflows,
            validator,
            proxies,
        }
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.ctx
    }

    pub fn proxies(&self) -> &Arc<ProxyCache> {
        &self.proxies
    }

    /// Start purging expired proxies in the background
    pub fn start_proxy_gc(&self) -> JoinHandle<()> {
        self.proxies.spawn_gc()
    }

    pub fn standard_creator(&self) -> Arc<dyn ClusterCreator> {
        Arc::new(StandardCreator::new(self.ctx.clone(), self.workflows.clone()))
    }

    pub fn standard_updater(&self) -> Arc<dyn ClusterUpdater> {
        Arc::new(StandardUpdater::new(self.ctx.clone(), self.workflows.clone()))
    }

    pub fn node_pool_updater(&self) -> Arc<dyn ClusterUpdater> {
        Arc::new(NodePoolUpdater::new(self.ctx.clone(), self.workflows.clone()))
    }

    /// Validate and persist a new cluster, then provision it in the background.
    ///
    /// Returns once the record is stored with status `Creating`.
    pub async fn create_cluster(
        &self,
        request: CreationContext,
        creator: Arc<dyn ClusterCreator>,
    ) -> Result<Box<dyn CommonCluster>> {
        let organization_id = request.organization_id;
        if self
            .ctx
            .repository
            .exists(organization_id, &request.name)
            .await?
        {
            return Err(Error::AlreadyExists {
                organization_id,
                name: request.name.clone(),
            });
        }

        let secret_id = validate_secrets(
            self.validator.as_ref(),
            organization_id,
            &request.secret_ids,
            request.cloud,
        )
        .await?;

        creator.validate(&request).await.map_err(as_invalid_request)?;

        let mut cluster = creator
            .prepare(&request, &secret_id, &self.ctx.cluster_factory())
            .await?;

        let timer =
            StatusChangeTimer::start(cluster.cloud(), cluster.location(), ClusterStatus::Running);
        if let Some(state) = &self.ctx.health_state {
            state.metrics.record_cluster_created(
                cluster.cloud(),
                cluster.distribution(),
                cluster.location(),
            );
        }
        cluster
            .set_status(ClusterStatus::Creating, "Cluster creation started")
            .await?;

        let cluster_id = cluster.id();
        info!(
            cluster_id,
            organization_id,
            cluster = %cluster.name(),
            distribution = %cluster.distribution(),
            "Cluster creation accepted"
        );

        let ctx = self.ctx.clone();
        spawn_background(
            self.ctx.clone(),
            cluster_id,
            organization_id,
            "cluster creation",
            async move {
                let mut cluster = ctx.load_cluster(cluster_id).await?;
                creator.create(cluster.as_mut(), &request).await?;
                if let Some(state) = &ctx.health_state {
                    timer.observe(&state.metrics);
                }
                ctx.events.publish(ClusterEvent::Created(cluster_id));
                info!(cluster_id, "Cluster created");
                Ok(())
            },
        );

        Ok(cluster)
    }

    /// Validate and accept an update, then apply it in the background
    pub async fn update_cluster(
        &self,
        request: UpdateContext,
        updater: Arc<dyn ClusterUpdater>,
    ) -> Result<()> {
        let organization_id = request.organization_id;
        let cluster_id = request.cluster_id;
        let mut cluster = self
            .ctx
            .load_cluster_in(organization_id, cluster_id)
            .await?;

        let status = cluster.status();
        if !status.is_stable() {
            return Err(Error::PreconditionFailed(format!(
                "cluster {} is {status} and can not be updated",
                cluster.name()
            )));
        }

        updater
            .validate(cluster.as_ref(), &request)
            .await
            .map_err(as_invalid_request)?;
        updater.prepare(cluster.as_mut(), &request).await?;

        let timer =
            StatusChangeTimer::start(cluster.cloud(), cluster.location(), ClusterStatus::Running);
        info!(cluster_id, organization_id, "Cluster update accepted");

        let ctx = self.ctx.clone();
        spawn_background(
            self.ctx.clone(),
            cluster_id,
            organization_id,
            "cluster update",
            async move {
                let mut cluster = ctx.load_cluster(cluster_id).await?;
                updater.update(cluster.as_mut(), &request).await?;
                if let Some(state) = &ctx.health_state {
                    timer.observe(&state.metrics);
                }
                ctx.events.publish(ClusterEvent::Updated(cluster_id));
                info!(cluster_id, "Cluster updated");
                Ok(())
            },
        );
        Ok(())
    }

    /// Change existing node pools, keeping the others untouched
    pub async fn update_node_pool(&self, request: UpdateContext) -> Result<()> {
        self.update_cluster(request, self.node_pool_updater()).await
    }

    /// Start deletion.
    ///
    /// Without `force` the cluster must not be busy with another operation.
    /// A cluster that is already being deleted is never deleted twice.
    pub async fn delete_cluster(
        &self,
        organization_id: OrganizationId,
        cluster_id: ClusterId,
        force: bool,
    ) -> Result<()> {
        let mut cluster = self
            .ctx
            .load_cluster_in(organization_id, cluster_id)
            .await?;

        let status = cluster.status();
        if status == ClusterStatus::Deleting {
            return Err(Error::PreconditionFailed(format!(
                "cluster {} is already being deleted",
                cluster.name()
            )));
        }
        if !force && status.is_in_progress() {
            return Err(Error::PreconditionFailed(format!(
                "cluster {} is {status} and can not be deleted",
                cluster.name()
            )));
        }

        let message = if force {
            "Forced cluster deletion started"
        } else {
            "Cluster deletion started"
        };
        cluster.set_status(ClusterStatus::Deleting, message).await?;
        self.proxies.remove(cluster.uid());

        let input = DeleteClusterWorkflowInput {
            cluster_id,
            organization_id,
            cluster_uid: cluster.uid().to_string(),
            force,
        };
        let options = StartWorkflowOptions::from_config(&self.ctx.config.workflow)
            .with_workflow_id(format!("delete-cluster-{cluster_id}"));
        let mut run =
            start_workflow::<DeleteClusterWorkflow>(self.workflows.as_ref(), options, &input)
                .await?;
        info!(
            cluster_id,
            organization_id,
            force,
            workflow_id = %run.id(),
            "Cluster deletion started"
        );

        spawn_background(
            self.ctx.clone(),
            cluster_id,
            organization_id,
            "cluster deletion",
            async move { get_result::<()>(run.as_mut()).await },
        );
        Ok(())
    }

    pub async fn get_cluster_status(
        &self,
        organization_id: OrganizationId,
        cluster_id: ClusterId,
    ) -> Result<ClusterStatusView> {
        let cluster = self
            .ctx
            .load_cluster_in(organization_id, cluster_id)
            .await?;
        Ok(cluster.status_view())
    }

    /// Cached API proxy for a cluster, built on a miss.
    ///
    /// RBAC-enabled clusters are reached with the user kubeconfig.
    pub async fn get_kube_proxy(
        &self,
        organization_id: OrganizationId,
        cluster_id: ClusterId,
    ) -> Result<Arc<KubeApiProxy>> {
        let cluster = self
            .ctx
            .load_cluster_in(organization_id, cluster_id)
            .await?;
        let uid = cluster.uid().to_string();
        self.proxies
            .get_or_create(&uid, || async {
                let kubeconfig = if cluster.record().rbac_enabled {
                    cluster.user_kubeconfig().await?
                } else {
                    cluster.kubeconfig().await?
                };
                KubeApiProxy::from_kubeconfig(uid.clone(), &kubeconfig).await
            })
            .await
    }
}

#[async_trait]
impl ClusterDeleter for ClusterManager {
    async fn delete_expired(&self, cluster: &Cluster) -> Result<()> {
        self.delete_cluster(cluster.organization_id, cluster.id, false)
            .await
    }
}

//! Cluster updates: full node pool replacement and node-pool-only changes.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::validation::{validate_node_pool, validate_node_pools};
use crate::cluster::{CommonCluster, Identity, Lifecycle, NodePoolAware, Scalable, StatusTracker};
use crate::controller::context::Context;
use crate::controller::error::{Error, Result};
use crate::labels::NodePoolLabelDescriptor;
use crate::model::{
    ClusterId, ClusterStatus, NodePool, NodePoolDiff, OrganizationId, ScaleOptions, UserId,
};
use crate::workflow::workflows::{
    UpdateClusterWorkflow, UpdateClusterWorkflowInput, UpdateClusterWorkflowOutput,
};
use crate::workflow::{StartWorkflowOptions, WorkflowClient, get_result, start_workflow};

/// A request to change a running cluster
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateContext {
    pub organization_id: OrganizationId,
    pub cluster_id: ClusterId,
    pub user_id: UserId,
    /// Requested pools. For a full update this is the complete new set.
    pub node_pools: Vec<NodePool>,
    #[serde(default)]
    pub scale_options: Option<ScaleOptions>,
}

/// Backend-specific steps of an update
#[async_trait]
pub trait ClusterUpdater: Send + Sync {
    async fn validate(&self, cluster: &dyn CommonCluster, request: &UpdateContext) -> Result<()>;

    /// Mark the cluster as updating and persist the accepted request
    async fn prepare(&self, cluster: &mut dyn CommonCluster, request: &UpdateContext) -> Result<()>;

    /// Apply the change. Runs on the background path and blocks until done.
    async fn update(&self, cluster: &mut dyn CommonCluster, request: &UpdateContext) -> Result<()>;
}

/// Label descriptors for the requested pools.
///
/// Pools the cluster already has are marked existing, so their applied
/// labels are kept unless the request carries labels for them.
pub fn label_descriptors(
    current: &[NodePool],
    requested: &[NodePool],
) -> Vec<NodePoolLabelDescriptor> {
    requested
        .iter()
        .map(|pool| {
            if current.iter().any(|c| c.name == pool.name) {
                NodePoolLabelDescriptor::existing_pool(pool)
            } else {
                NodePoolLabelDescriptor::new_pool(pool)
            }
        })
        .collect()
}

/// Apply a diff through the backend's direct update or the update workflow
async fn apply_diff(
    ctx: &Context,
    workflows: &dyn WorkflowClient,
    cluster: &mut dyn CommonCluster,
    diff: NodePoolDiff,
    label_pools: Vec<NodePoolLabelDescriptor>,
) -> Result<()> {
    match cluster.update(&diff).await {
        Err(Error::NotSupported(_)) => {}
        direct => return direct,
    }

    let cluster_id = cluster.id();
    let input = UpdateClusterWorkflowInput {
        cluster_id,
        node_pools_to_delete: diff.to_delete,
        node_pools_to_create: diff.to_create,
        node_pools_to_update: diff.to_update,
        node_pool_labels: label_pools,
        deploy_autoscaler: true,
    };
    let options = StartWorkflowOptions::from_config(&ctx.config.workflow)
        .with_workflow_id(format!("update-cluster-{cluster_id}-{}", uuid::Uuid::new_v4()));
    let mut run = start_workflow::<UpdateClusterWorkflow>(workflows, options, &input).await?;
    info!(cluster_id, workflow_id = %run.id(), "Update workflow started");

    let output: UpdateClusterWorkflowOutput = get_result(run.as_mut()).await?;
    if !output.failures.is_empty() {
        warn!(
            cluster_id,
            failures = ?output.failures,
            "Update finished with failed steps"
        );
    }
    Ok(())
}

async fn mark_updating(cluster: &mut dyn CommonCluster, request: &UpdateContext) -> Result<()> {
    if request.scale_options.is_some() {
        cluster.set_scale_options(request.scale_options.clone());
    }
    cluster
        .set_status(ClusterStatus::Updating, "Cluster update started")
        .await
}

/// Replaces the cluster's pool set with the requested one
pub struct StandardUpdater {
    ctx: Arc<Context>,
    workflows: Arc<dyn WorkflowClient>,
}

impl StandardUpdater {
    pub fn new(ctx: Arc<Context>, workflows: Arc<dyn WorkflowClient>) -> Self {
        Self { ctx, workflows }
    }
}

#[async_trait]
impl ClusterUpdater for StandardUpdater {
    async fn validate(&self, cluster: &dyn CommonCluster, request: &UpdateContext) -> Result<()> {
        validate_node_pools(&request.node_pools)?;
        for pool in &request.node_pools {
            let Some(current) = cluster.node_pools().iter().find(|p| p.name == pool.name) else {
                continue;
            };
            if current.roles != pool.roles {
                return Err(Error::InvalidRequest(format!(
                    "roles of node pool {} can not be changed",
                    pool.name
                )));
            }
        }
        if cluster
            .node_pools()
            .iter()
            .any(|p| p.is_master() && !request.node_pools.iter().any(|r| r.name == p.name))
        {
            return Err(Error::InvalidRequest(
                "master node pools can not be removed".to_string(),
            ));
        }
        Ok(())
    }

    async fn prepare(&self, cluster: &mut dyn CommonCluster, request: &UpdateContext) -> Result<()> {
        mark_updating(cluster, request).await
    }

    async fn update(&self, cluster: &mut dyn CommonCluster, request: &UpdateContext) -> Result<()> {
        let current = cluster.node_pools().to_vec();
        let diff = NodePoolDiff::compute(&current, &request.node_pools);
        let labels = label_descriptors(&current, &request.node_pools);
        apply_diff(&self.ctx, self.workflows.as_ref(), cluster, diff, labels).await
    }
}

/// Changes existing pools only; pools not named in the request are kept
pub struct NodePoolUpdater {
    ctx: Arc<Context>,
    workflows: Arc<dyn WorkflowClient>,
}

impl NodePoolUpdater {
    pub fn new(ctx: Arc<Context>, workflows: Arc<dyn WorkflowClient>) -> Self {
        Self { ctx, workflows }
    }
}

#[async_trait]
impl ClusterUpdater for NodePoolUpdater {
    async fn validate(&self, cluster: &dyn CommonCluster, request: &UpdateContext) -> Result<()> {
        if request.node_pools.is_empty() {
            return Err(Error::InvalidRequest("no node pool to update".to_string()));
        }
        for pool in &request.node_pools {
            if !cluster.node_pool_exists(&pool.name) {
                return Err(Error::NotFound(format!("node pool {}", pool.name)));
            }
            validate_node_pool(pool)?;
        }
        Ok(())
    }

    async fn prepare(&self, cluster: &mut dyn CommonCluster, request: &UpdateContext) -> Result<()> {
        mark_updating(cluster, request).await
    }

    async fn update(&self, cluster: &mut dyn CommonCluster, request: &UpdateContext) -> Result<()> {
        let current = cluster.node_pools().to_vec();
        let to_update: Vec<NodePool> = request
            .node_pools
            .iter()
            .filter(|pool| current.iter().any(|c| c.name == pool.name && c != *pool))
            .cloned()
            .collect();
        let labels = label_descriptors(&current, &to_update);
        let diff = NodePoolDiff {
            to_update,
            ..Default::default()
        };
        apply_diff(&self.ctx, self.workflows.as_ref(), cluster, diff, labels).await
    }
}

//! Cluster creation: request shape and the creator port.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::validation::{validate_backend, validate_cluster_name, validate_node_pools};
use crate::cluster::{ClusterFactory, CommonCluster, Identity, Lifecycle, Persistent, SecretBound};
use crate::controller::context::Context;
use crate::controller::error::{Error, Result};
use crate::model::{
    BackendSpec, Cloud, Cluster, ClusterStatus, Distribution, InfrastructureState, NodePool,
    OrganizationId, ScaleOptions, UserId,
};
use crate::workflow::workflows::{CreateClusterWorkflow, CreateClusterWorkflowInput};
use crate::workflow::{StartWorkflowOptions, WorkflowClient, get_result, start_workflow};

/// A validated-on-demand request to create a cluster
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreationContext {
    pub organization_id: OrganizationId,
    pub user_id: UserId,
    pub name: String,
    pub cloud: Cloud,
    pub location: String,
    /// Candidate cloud credentials, the first valid one is used
    pub secret_ids: Vec<String>,
    pub backend: BackendSpec,
    pub node_pools: Vec<NodePool>,
    #[serde(default)]
    pub scale_options: Option<ScaleOptions>,
    #[serde(default = "default_rbac")]
    pub rbac_enabled: bool,
    /// Zero disables expiry
    #[serde(default)]
    pub ttl_minutes: u32,
    /// Hook name to parameter
    #[serde(default)]
    pub post_hooks: BTreeMap<String, serde_json::Value>,
}

fn default_rbac() -> bool {
    true
}

impl CreationContext {
    pub fn distribution(&self) -> Distribution {
        self.backend.distribution()
    }
}

/// Backend-specific steps of a creation
#[async_trait]
pub trait ClusterCreator: Send + Sync {
    /// Reject requests the backend cannot satisfy
    async fn validate(&self, request: &CreationContext) -> Result<()>;

    /// Build the unsaved entity for the request
    async fn prepare(
        &self,
        request: &CreationContext,
        secret_id: &str,
        factory: &ClusterFactory,
    ) -> Result<Box<dyn CommonCluster>>;

    /// Provision the cluster. Runs on the background path and blocks until done.
    async fn create(&self, cluster: &mut dyn CommonCluster, request: &CreationContext) -> Result<()>;
}

/// Creator for every built-in backend.
///
/// Uses the backend's direct create when it has one and runs the create
/// workflow otherwise.
pub struct StandardCreator {
    ctx: Arc<Context>,
    workflows: Arc<dyn WorkflowClient>,
}

impl StandardCreator {
    pub fn new(ctx: Arc<Context>, workflows: Arc<dyn WorkflowClient>) -> Self {
        Self { ctx, workflows }
    }

    /// Self-hosted nodes are reached over SSH and need a key pair
    async fn ensure_ssh_key(&self, cluster: &mut dyn CommonCluster) -> Result<()> {
        if cluster.distribution() != Distribution::SelfHosted || cluster.ssh_secret_id().is_some()
        {
            return Ok(());
        }
        let secret_id = self
            .ctx
            .secrets
            .create_ssh_key(cluster.organization_id(), cluster.name(), cluster.uid())
            .await?;
        debug!(cluster_id = cluster.id(), secret_id = %secret_id, "SSH key generated");
        cluster.set_ssh_secret_id(secret_id);
        cluster.persist().await
    }
}

#[async_trait]
impl ClusterCreator for StandardCreator {
    async fn validate(&self, request: &CreationContext) -> Result<()> {
        validate_cluster_name(&request.name)?;
        validate_node_pools(&request.node_pools)?;
        validate_backend(&request.backend, request.cloud, &request.node_pools)?;
        if request.location.trim().is_empty() {
            return Err(Error::InvalidRequest("location is required".to_string()));
        }
        self.ctx.hooks.plan(&request.post_hooks)?;
        Ok(())
    }

    async fn prepare(
        &self,
        request: &CreationContext,
        secret_id: &str,
        factory: &ClusterFactory,
    ) -> Result<Box<dyn CommonCluster>> {
        let record = Cluster {
            id: 0,
            uid: String::new(),
            organization_id: request.organization_id,
            name: request.name.clone(),
            cloud: request.cloud,
            distribution: request.distribution(),
            location: request.location.clone(),
            status: ClusterStatus::Creating,
            status_message: String::new(),
            secret_id: secret_id.to_string(),
            ssh_secret_id: None,
            config_secret_id: None,
            rbac_enabled: request.rbac_enabled,
            scale_options: request.scale_options.clone(),
            ttl_minutes: request.ttl_minutes,
            started_at: None,
            created_at: Timestamp::now(),
            created_by: request.user_id,
            node_pools: request.node_pools.clone(),
            backend: request.backend.clone(),
            infrastructure: InfrastructureState::default(),
        };
        factory.build(record)
    }

    async fn create(&self, cluster: &mut dyn CommonCluster, request: &CreationContext) -> Result<()> {
        self.ensure_ssh_key(cluster).await?;

        match cluster.create().await {
            Err(Error::NotSupported(_)) => {}
            direct => return direct,
        }

        let cluster_id = cluster.id();
        let input = CreateClusterWorkflowInput {
            cluster_id,
            organization_id: cluster.organization_id(),
            node_pools: cluster.record().node_pools.clone(),
            post_hooks: request.post_hooks.clone(),
        };
        let options = StartWorkflowOptions::from_config(&self.ctx.config.workflow)
            .with_workflow_id(format!("create-cluster-{cluster_id}"));
        let mut run =
            start_workflow::<CreateClusterWorkflow>(self.workflows.as_ref(), options, &input)
                .await?;
        info!(
            cluster_id,
            workflow_id = %run.id(),
            run_id = %run.run_id(),
            "Create workflow started"
        );
        get_result::<()>(run.as_mut()).await
    }
}

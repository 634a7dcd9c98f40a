use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cluster::{Identity, KubeconfigProvider, Persistent, SecretBound};
use crate::controller::context::Context;
use crate::controller::error::Result;
use crate::labels::{self, NODE_POOL_NAME_LABEL, NodePoolLabelDescriptor, PoolLabels};
use crate::model::ClusterId;
use crate::posthook::{PostHookRegistry, deploy_cluster_autoscaler};
use crate::workflow::Activity;

/// Fetch or generate the admin kubeconfig and store it as the config secret
pub struct DownloadKubeconfig {
    ctx: Arc<Context>,
}

impl DownloadKubeconfig {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Activity for DownloadKubeconfig {
    const NAME: &'static str = "download-kubeconfig";
    type Input = ClusterId;
    type Output = String;

    async fn execute(&self, cluster_id: ClusterId) -> Result<String> {
        let mut cluster = self.ctx.load_cluster(cluster_id).await?;

        let config = match cluster.as_config_downloader() {
            Some(downloader) => {
                let provisioner = self.ctx.provisioner(cluster.distribution())?;
                downloader.download_kubeconfig(provisioner.as_ref()).await?
            }
            None => cluster.kubeconfig().await?,
        };

        let secret_id = self
            .ctx
            .secrets
            .store_kubeconfig(cluster.organization_id(), cluster.name(), &config)
            .await?;
        if cluster.config_secret_id() != Some(secret_id.as_str()) {
            cluster.set_config_secret_id(secret_id.clone());
            cluster.persist().await?;
        }
        info!(cluster_id, secret_id = %secret_id, "Kubeconfig stored");
        Ok(secret_id)
    }
}

/// Bind cluster-admin on backends that do not grant it to the creator
pub struct SetupPrivileges {
    ctx: Arc<Context>,
}

impl SetupPrivileges {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Activity for SetupPrivileges {
    const NAME: &'static str = "setup-privileges";
    type Input = ClusterId;
    type Output = ();

    async fn execute(&self, cluster_id: ClusterId) -> Result<()> {
        let cluster = self.ctx.load_cluster(cluster_id).await?;
        let Some(access) = cluster.as_privileged_access() else {
            debug!(cluster_id, "Backend needs no privilege setup");
            return Ok(());
        };

        let cluster_ref = cluster.cluster_ref();
        for subject in access.admin_subjects() {
            self.ctx
                .kubernetes
                .ensure_cluster_admin_binding(&cluster_ref, &subject)
                .await?;
        }
        Ok(())
    }
}

/// Label nodes with their pool name on backends that cannot do it natively
pub struct LabelNodes {
    ctx: Arc<Context>,
}

impl LabelNodes {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Activity for LabelNodes {
    const NAME: &'static str = "label-nodes";
    type Input = ClusterId;
    type Output = ();

    async fn execute(&self, cluster_id: ClusterId) -> Result<()> {
        let cluster = self.ctx.load_cluster(cluster_id).await?;
        let Some(lister) = cluster.as_node_name_lister() else {
            return Ok(());
        };

        let cluster_ref = cluster.cluster_ref();
        for (pool, nodes) in lister.node_names() {
            if nodes.is_empty() {
                continue;
            }
            let labels = BTreeMap::from([(NODE_POOL_NAME_LABEL.to_string(), pool.clone())]);
            self.ctx
                .kubernetes
                .label_nodes(&cluster_ref, &nodes, &labels)
                .await?;
            debug!(cluster_id, pool = %pool, nodes = nodes.len(), "Nodes labeled");
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileNodePoolLabelsInput {
    pub cluster_id: ClusterId,
    pub pools: Vec<NodePoolLabelDescriptor>,
}

/// Compute desired pool labels and sync them to the cluster
pub struct ReconcileNodePoolLabels {
    ctx: Arc<Context>,
}

impl ReconcileNodePoolLabels {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Activity for ReconcileNodePoolLabels {
    const NAME: &'static str = "reconcile-node-pool-labels";
    type Input = ReconcileNodePoolLabelsInput;
    type Output = PoolLabels;

    async fn execute(&self, input: ReconcileNodePoolLabelsInput) -> Result<PoolLabels> {
        let cluster = self.ctx.load_cluster(input.cluster_id).await?;
        let desired = labels::desired_labels(
            self.ctx.label_source.as_ref(),
            cluster.cloud(),
            cluster.distribution(),
            cluster.location(),
            &input.pools,
        )
        .await?;
        if desired.is_empty() {
            return Ok(desired);
        }

        self.ctx
            .kubernetes
            .sync_node_pool_labels(
                &cluster.cluster_ref(),
                &self.ctx.config.kubernetes.system_namespace,
                &desired,
            )
            .await?;
        Ok(desired)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunPostHookInput {
    pub cluster_id: ClusterId,
    pub hook: String,
    #[serde(default)]
    pub param: serde_json::Value,
}

pub struct RunPostHook {
    ctx: Arc<Context>,
}

impl RunPostHook {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    pub fn hooks(&self) -> &PostHookRegistry {
        &self.ctx.hooks
    }
}

#[async_trait]
impl Activity for RunPostHook {
    const NAME: &'static str = "run-posthook";
    type Input = RunPostHookInput;
    type Output = ();

    async fn execute(&self, input: RunPostHookInput) -> Result<()> {
        let hook = self.ctx.hooks.get(&input.hook)?;
        let cluster = self.ctx.load_cluster(input.cluster_id).await?;
        hook.run(&self.ctx, cluster.as_ref(), &input.param).await
    }
}

/// Install, upgrade or remove the cluster autoscaler to match the pools
pub struct DeployAutoscaler {
    ctx: Arc<Context>,
}

impl DeployAutoscaler {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Activity for DeployAutoscaler {
    const NAME: &'static str = "deploy-autoscaler";
    type Input = ClusterId;
    type Output = ();

    async fn execute(&self, cluster_id: ClusterId) -> Result<()> {
        let cluster = self.ctx.load_cluster(cluster_id).await?;
        deploy_cluster_autoscaler(&self.ctx, cluster.as_ref()).await
    }
}

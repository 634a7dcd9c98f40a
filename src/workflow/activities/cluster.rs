use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cluster::{NodePoolAware, Persistent, StatusTracker};
use crate::controller::context::Context;
use crate::controller::error::Result;
use crate::controller::events::ClusterEvent;
use crate::model::{ClusterId, ClusterStatus, InfrastructureState, NodePool};
use crate::workflow::Activity;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetClusterStatusInput {
    pub cluster_id: ClusterId,
    pub status: ClusterStatus,
    pub message: String,
}

impl SetClusterStatusInput {
    pub fn new(cluster_id: ClusterId, status: ClusterStatus, message: impl Into<String>) -> Self {
        Self {
            cluster_id,
            status,
            message: message.into(),
        }
    }
}

/// Write a status change, with history
pub struct SetClusterStatus {
    ctx: Arc<Context>,
}

impl SetClusterStatus {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Activity for SetClusterStatus {
    const NAME: &'static str = "set-cluster-status";
    type Input = SetClusterStatusInput;
    type Output = ();

    async fn execute(&self, input: SetClusterStatusInput) -> Result<()> {
        let mut cluster = self.ctx.load_cluster(input.cluster_id).await?;
        cluster.set_status(input.status, &input.message).await
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveInfrastructureInput {
    pub cluster_id: ClusterId,
    pub infrastructure: InfrastructureState,
}

/// Persist provisioning outputs on the record
pub struct SaveInfrastructure {
    ctx: Arc<Context>,
}

impl SaveInfrastructure {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Activity for SaveInfrastructure {
    const NAME: &'static str = "save-infrastructure";
    type Input = SaveInfrastructureInput;
    type Output = ();

    async fn execute(&self, input: SaveInfrastructureInput) -> Result<()> {
        let mut cluster = self.ctx.load_cluster(input.cluster_id).await?;
        cluster.set_infrastructure(input.infrastructure);
        cluster.persist().await
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveNodePoolsInput {
    pub cluster_id: ClusterId,
    /// Pools to drop from the record
    pub removed: Vec<String>,
    /// Pools to add, or replace by name
    pub upserted: Vec<NodePool>,
}

/// Apply a node pool change set to the record
pub struct SaveNodePools {
    ctx: Arc<Context>,
}

impl SaveNodePools {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Activity for SaveNodePools {
    const NAME: &'static str = "save-node-pools";
    type Input = SaveNodePoolsInput;
    type Output = ();

    async fn execute(&self, input: SaveNodePoolsInput) -> Result<()> {
        let mut cluster = self.ctx.load_cluster(input.cluster_id).await?;

        let mut pools: Vec<NodePool> = cluster
            .node_pools()
            .iter()
            .filter(|pool| !input.removed.contains(&pool.name))
            .cloned()
            .collect();
        for pool in input.upserted {
            match pools.iter_mut().find(|existing| existing.name == pool.name) {
                Some(existing) => *existing = pool,
                None => pools.push(pool),
            }
        }

        cluster.set_node_pools(pools);
        cluster.persist().await
    }
}

/// Remove the cluster record. Succeeds if it is already gone.
pub struct DeleteClusterRecord {
    ctx: Arc<Context>,
}

impl DeleteClusterRecord {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Activity for DeleteClusterRecord {
    const NAME: &'static str = "delete-cluster-record";
    type Input = ClusterId;
    type Output = ();

    async fn execute(&self, cluster_id: ClusterId) -> Result<()> {
        self.ctx.repository.delete(cluster_id).await?;
        self.ctx.events.publish(ClusterEvent::Deleted(cluster_id));
        info!(cluster_id, "Cluster record removed");
        Ok(())
    }
}

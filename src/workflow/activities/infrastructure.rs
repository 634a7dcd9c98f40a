//! Calls into the distribution's provisioner. The provisioner contract
//! requires every call to be idempotent.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::controller::context::Context;
use crate::controller::error::Result;
use crate::model::{ClusterId, InfrastructureState, NodePool};
use crate::workflow::Activity;

/// Control plane and networking for a new cluster
pub struct CreateInfrastructure {
    ctx: Arc<Context>,
}

impl CreateInfrastructure {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Activity for CreateInfrastructure {
    const NAME: &'static str = "create-infrastructure";
    type Input = ClusterId;
    type Output = InfrastructureState;

    async fn execute(&self, cluster_id: ClusterId) -> Result<InfrastructureState> {
        let record = self.ctx.repository.get(cluster_id).await?;
        let provisioner = self.ctx.provisioner(record.distribution)?;
        let state = provisioner.create_infrastructure(&record).await?;
        info!(
            cluster_id,
            provider_id = ?state.provider_id,
            endpoint = ?state.api_endpoint,
            "Infrastructure created"
        );
        Ok(state)
    }
}

/// Tear down everything the provisioner created
pub struct DeleteInfrastructure {
    ctx: Arc<Context>,
}

impl DeleteInfrastructure {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Activity for DeleteInfrastructure {
    const NAME: &'static str = "delete-infrastructure";
    type Input = ClusterId;
    type Output = ();

    async fn execute(&self, cluster_id: ClusterId) -> Result<()> {
        let record = match self.ctx.repository.get(cluster_id).await {
            Ok(record) => record,
            Err(e) if e.is_not_found() => {
                debug!(cluster_id, "Cluster record gone, nothing to tear down");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        let provisioner = self.ctx.provisioner(record.distribution)?;
        provisioner.delete_infrastructure(&record).await?;
        info!(cluster_id, "Infrastructure deleted");
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePoolInput {
    pub cluster_id: ClusterId,
    pub pool: NodePool,
}

pub struct CreateNodePool {
    ctx: Arc<Context>,
}

impl CreateNodePool {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Activity for CreateNodePool {
    const NAME: &'static str = "create-node-pool";
    type Input = NodePoolInput;
    type Output = ();

    async fn execute(&self, input: NodePoolInput) -> Result<()> {
        let record = self.ctx.repository.get(input.cluster_id).await?;
        let provisioner = self.ctx.provisioner(record.distribution)?;
        provisioner.create_node_pool(&record, &input.pool).await?;
        debug!(cluster_id = input.cluster_id, pool = %input.pool.name, "Node pool created");
        Ok(())
    }
}

pub struct UpdateNodePool {
    ctx: Arc<Context>,
}

impl UpdateNodePool {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Activity for UpdateNodePool {
    const NAME: &'static str = "update-node-pool";
    type Input = NodePoolInput;
    type Output = ();

    async fn execute(&self, input: NodePoolInput) -> Result<()> {
        let record = self.ctx.repository.get(input.cluster_id).await?;
        let provisioner = self.ctx.provisioner(record.distribution)?;
        provisioner.update_node_pool(&record, &input.pool).await?;
        debug!(cluster_id = input.cluster_id, pool = %input.pool.name, "Node pool updated");
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteNodePoolInput {
    pub cluster_id: ClusterId,
    pub pool_name: String,
}

pub struct DeleteNodePool {
    ctx: Arc<Context>,
}

impl DeleteNodePool {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Activity for DeleteNodePool {
    const NAME: &'static str = "delete-node-pool";
    type Input = DeleteNodePoolInput;
    type Output = ();

    async fn execute(&self, input: DeleteNodePoolInput) -> Result<()> {
        let record = self.ctx.repository.get(input.cluster_id).await?;
        let provisioner = self.ctx.provisioner(record.distribution)?;
        provisioner
            .delete_node_pool(&record, &input.pool_name)
            .await?;
        debug!(cluster_id = input.cluster_id, pool = %input.pool_name, "Node pool deleted");
        Ok(())
    }
}

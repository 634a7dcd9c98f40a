use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{ClusterSetupWorkflow, ClusterSetupWorkflowInput, PostHookWorkflow, PostHookWorkflowInput};
use crate::controller::error::Result;
use crate::labels::NodePoolLabelDescriptor;
use crate::model::{ClusterId, ClusterStatus, NodePool, OrganizationId};
use crate::workflow::activities::{
    Activities, NodePoolInput, SaveInfrastructureInput, SetClusterStatusInput,
};
use crate::workflow::{Workflow, WorkflowContext};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateClusterWorkflowInput {
    pub cluster_id: ClusterId,
    pub organization_id: OrganizationId,
    pub node_pools: Vec<NodePool>,
    /// Hook name to parameter
    #[serde(default)]
    pub post_hooks: BTreeMap<String, serde_json::Value>,
}

/// Provision infrastructure, configure the cluster, then run posthooks.
///
/// Any failure before the posthooks marks the cluster `Error`; the posthook
/// workflow records its own failures.
pub struct CreateClusterWorkflow {
    activities: Activities,
    setup: ClusterSetupWorkflow,
    posthooks: PostHookWorkflow,
}

impl CreateClusterWorkflow {
    pub fn new(activities: Activities) -> Self {
        Self {
            setup: ClusterSetupWorkflow::new(activities.clone()),
            posthooks: PostHookWorkflow::new(activities.clone()),
            activities,
        }
    }

    async fn provision(&self, ctx: &WorkflowContext, input: &CreateClusterWorkflowInput) -> Result<()> {
        let a = &self.activities;
        let cluster_id = input.cluster_id;

        let infrastructure = ctx
            .execute_activity(a.create_infrastructure.as_ref(), cluster_id)
            .await?;
        ctx.execute_activity(
            a.save_infrastructure.as_ref(),
            SaveInfrastructureInput {
                cluster_id,
                infrastructure,
            },
        )
        .await?;

        let pools = input.node_pools.iter().map(|pool| {
            ctx.execute_activity(
                a.create_node_pool.as_ref(),
                NodePoolInput {
                    cluster_id,
                    pool: pool.clone(),
                },
            )
        });
        join_all(pools).await.into_iter().collect::<Result<Vec<_>>>()?;
        info!(cluster_id, pools = input.node_pools.len(), "Node pools created");

        ctx.execute_child_workflow(
            &self.setup,
            ClusterSetupWorkflowInput {
                cluster_id,
                node_pool_labels: input
                    .node_pools
                    .iter()
                    .map(NodePoolLabelDescriptor::new_pool)
                    .collect(),
            },
        )
        .await
    }
}

#[async_trait]
impl Workflow for CreateClusterWorkflow {
    const NAME: &'static str = "create-cluster";
    type Input = CreateClusterWorkflowInput;
    type Output = ();

    async fn run(&self, ctx: &WorkflowContext, input: CreateClusterWorkflowInput) -> Result<()> {
        let cluster_id = input.cluster_id;

        if let Err(e) = self.provision(ctx, &input).await {
            let failed = ctx
                .execute_activity(
                    self.activities.set_status.as_ref(),
                    SetClusterStatusInput::new(
                        cluster_id,
                        ClusterStatus::Error,
                        format!("cluster creation failed: {e}"),
                    ),
                )
                .await;
            if let Err(status_error) = failed {
                warn!(cluster_id, error = %status_error, "Could not mark cluster as failed");
            }
            return Err(e);
        }

        ctx.execute_child_workflow(
            &self.posthooks,
            PostHookWorkflowInput {
                cluster_id,
                hooks: input.post_hooks,
            },
        )
        .await
    }
}

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::controller::error::Result;
use crate::labels::NodePoolLabelDescriptor;
use crate::model::ClusterId;
use crate::workflow::activities::{Activities, ReconcileNodePoolLabelsInput};
use crate::workflow::{Workflow, WorkflowContext};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSetupWorkflowInput {
    pub cluster_id: ClusterId,
    pub node_pool_labels: Vec<NodePoolLabelDescriptor>,
}

/// Common configuration of a freshly provisioned cluster
pub struct ClusterSetupWorkflow {
    activities: Activities,
}

impl ClusterSetupWorkflow {
    pub fn new(activities: Activities) -> Self {
        Self { activities }
    }
}

#[async_trait]
impl Workflow for ClusterSetupWorkflow {
    const NAME: &'static str = "setup-cluster";
    type Input = ClusterSetupWorkflowInput;
    type Output = ();

    async fn run(&self, ctx: &WorkflowContext, input: ClusterSetupWorkflowInput) -> Result<()> {
        let a = &self.activities;
        let cluster_id = input.cluster_id;

        ctx.execute_activity(a.download_kubeconfig.as_ref(), cluster_id)
            .await?;
        ctx.execute_activity(a.setup_privileges.as_ref(), cluster_id)
            .await?;
        ctx.execute_activity(a.label_nodes.as_ref(), cluster_id).await?;
        ctx.execute_activity(
            a.reconcile_labels.as_ref(),
            ReconcileNodePoolLabelsInput {
                cluster_id,
                pools: input.node_pool_labels,
            },
        )
        .await?;
        Ok(())
    }
}

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::controller::error::Result;
use crate::labels::NodePoolLabelDescriptor;
use crate::model::{ClusterId, ClusterStatus, NodePool};
use crate::workflow::activities::{
    Activities, DeleteNodePoolInput, NodePoolInput, ReconcileNodePoolLabelsInput,
    SaveNodePoolsInput, SetClusterStatusInput,
};
use crate::workflow::{Workflow, WorkflowContext};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateClusterWorkflowInput {
    pub cluster_id: ClusterId,
    pub node_pools_to_delete: Vec<String>,
    pub node_pools_to_create: Vec<NodePool>,
    pub node_pools_to_update: Vec<NodePool>,
    pub node_pool_labels: Vec<NodePoolLabelDescriptor>,
    #[serde(default = "default_true")]
    pub deploy_autoscaler: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateClusterWorkflowOutput {
    /// Step or pool name to error message
    pub failures: BTreeMap<String, String>,
}

/// Apply a node pool change set.
///
/// All pool deletions finish before any creation or update starts. Failed
/// pool operations leave the cluster in `Warning` since it stays reachable;
/// only a failure to persist the result marks it `Error`.
pub struct UpdateClusterWorkflow {
    activities: Activities,
}

impl UpdateClusterWorkflow {
    pub fn new(activities: Activities) -> Self {
        Self { activities }
    }
}

#[async_trait]
impl Workflow for UpdateClusterWorkflow {
    const NAME: &'static str = "update-cluster";
    type Input = UpdateClusterWorkflowInput;
    type Output = UpdateClusterWorkflowOutput;

    async fn run(
        &self,
        ctx: &WorkflowContext,
        input: UpdateClusterWorkflowInput,
    ) -> Result<UpdateClusterWorkflowOutput> {
        let a = &self.activities;
        let cluster_id = input.cluster_id;
        let mut failures = BTreeMap::new();

        let deletions = input.node_pools_to_delete.iter().map(|name| async move {
            let result = ctx
                .execute_activity(
                    a.delete_node_pool.as_ref(),
                    DeleteNodePoolInput {
                        cluster_id,
                        pool_name: name.clone(),
                    },
                )
                .await;
            (name.clone(), result)
        });
        let mut removed = Vec::new();
        for (name, result) in join_all(deletions).await {
            match result {
                Ok(()) => removed.push(name),
                Err(e) => {
                    failures.insert(name, e.to_string());
                }
            }
        }

        let creations = input.node_pools_to_create.iter().map(|pool| async move {
            let result = ctx
                .execute_activity(
                    a.create_node_pool.as_ref(),
                    NodePoolInput {
                        cluster_id,
                        pool: pool.clone(),
                    },
                )
                .await;
            (pool.clone(), result)
        });
        let updates = input.node_pools_to_update.iter().map(|pool| async move {
            let result = ctx
                .execute_activity(
                    a.update_node_pool.as_ref(),
                    NodePoolInput {
                        cluster_id,
                        pool: pool.clone(),
                    },
                )
                .await;
            (pool.clone(), result)
        });
        let (created, updated) = futures::join!(join_all(creations), join_all(updates));

        let mut upserted = Vec::new();
        for (pool, result) in created.into_iter().chain(updated) {
            match result {
                Ok(()) => upserted.push(pool),
                Err(e) => {
                    failures.insert(pool.name, e.to_string());
                }
            }
        }

        let saved = ctx
            .execute_activity(
                a.save_node_pools.as_ref(),
                SaveNodePoolsInput {
                    cluster_id,
                    removed,
                    upserted,
                },
            )
            .await;
        if let Err(e) = saved {
            ctx.execute_activity(
                a.set_status.as_ref(),
                SetClusterStatusInput::new(
                    cluster_id,
                    ClusterStatus::Error,
                    format!("failed to save node pools: {e}"),
                ),
            )
            .await?;
            return Err(e);
        }

        if let Err(e) = ctx
            .execute_activity(a.label_nodes.as_ref(), cluster_id)
            .await
        {
            failures.insert("node labeling".to_string(), e.to_string());
        }

        let label_pools: Vec<_> = input
            .node_pool_labels
            .into_iter()
            .filter(|pool| !failures.contains_key(&pool.name))
            .collect();
        if let Err(e) = ctx
            .execute_activity(
                a.reconcile_labels.as_ref(),
                ReconcileNodePoolLabelsInput {
                    cluster_id,
                    pools: label_pools,
                },
            )
            .await
        {
            failures.insert("node pool labels".to_string(), e.to_string());
        }

        if input.deploy_autoscaler {
            if let Err(e) = ctx
                .execute_activity(a.deploy_autoscaler.as_ref(), cluster_id)
                .await
            {
                failures.insert("cluster autoscaler".to_string(), e.to_string());
            }
        }

        let (status, message) = if failures.is_empty() {
            info!(cluster_id, "Cluster updated");
            (ClusterStatus::Running, "Cluster updated successfully".to_string())
        } else {
            warn!(cluster_id, failures = failures.len(), "Cluster updated with failures");
            let failed: Vec<_> = failures
                .iter()
                .map(|(name, error)| format!("{name}: {error}"))
                .collect();
            (
                ClusterStatus::Warning,
                format!("update finished with failures: {}", failed.join("; ")),
            )
        };
        ctx.execute_activity(
            a.set_status.as_ref(),
            SetClusterStatusInput::new(cluster_id, status, message),
        )
        .await?;

        Ok(UpdateClusterWorkflowOutput { failures })
    }
}

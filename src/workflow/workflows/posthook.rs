use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::controller::error::Result;
use crate::model::{ClusterId, ClusterStatus};
use crate::workflow::activities::{Activities, RunPostHookInput, SetClusterStatusInput};
use crate::workflow::{Workflow, WorkflowContext};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostHookWorkflowInput {
    pub cluster_id: ClusterId,
    /// Hook name to parameter
    #[serde(default)]
    pub hooks: BTreeMap<String, serde_json::Value>,
}

/// Runs the planned posthooks in order and marks the cluster running.
///
/// The first failing hook puts the cluster into `Error` and stops the sequence.
pub struct PostHookWorkflow {
    activities: Activities,
}

impl PostHookWorkflow {
    pub fn new(activities: Activities) -> Self {
        Self { activities }
    }
}

#[async_trait]
impl Workflow for PostHookWorkflow {
    const NAME: &'static str = "run-posthooks";
    type Input = PostHookWorkflowInput;
    type Output = ();

    async fn run(&self, ctx: &WorkflowContext, input: PostHookWorkflowInput) -> Result<()> {
        let a = &self.activities;
        let cluster_id = input.cluster_id;

        let plan = match a.run_posthook.hooks().plan(&input.hooks) {
            Ok(plan) => plan,
            Err(e) => {
                let message = format!("invalid posthooks: {e}");
                ctx.execute_activity(
                    a.set_status.as_ref(),
                    SetClusterStatusInput::new(cluster_id, ClusterStatus::Error, message),
                )
                .await?;
                return Err(e);
            }
        };

        for hook in plan {
            info!(cluster_id, hook = %hook.name, "Running posthook");
            let result = ctx
                .execute_activity(
                    a.run_posthook.as_ref(),
                    RunPostHookInput {
                        cluster_id,
                        hook: hook.name.clone(),
                        param: hook.param,
                    },
                )
                .await;

            if let Err(e) = result {
                ctx.execute_activity(
                    a.set_status.as_ref(),
                    SetClusterStatusInput::new(
                        cluster_id,
                        ClusterStatus::Error,
                        format!("hook {} failed: {e}", hook.name),
                    ),
                )
                .await?;
                return Err(e);
            }
        }

        ctx.execute_activity(
            a.set_status.as_ref(),
            SetClusterStatusInput::new(cluster_id, ClusterStatus::Running, "Cluster created successfully"),
        )
        .await
    }
}

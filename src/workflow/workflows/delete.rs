use std::future::Future;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::controller::error::{Error, Result};
use crate::model::{ClusterId, ClusterStatus, OrganizationId};
use crate::workflow::activities::{Activities, DeleteDnsRecordsInput, SetClusterStatusInput};
use crate::workflow::{Workflow, WorkflowContext};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteClusterWorkflowInput {
    pub cluster_id: ClusterId,
    pub organization_id: OrganizationId,
    pub cluster_uid: String,
    pub force: bool,
}

/// Tear a cluster down and remove its record.
///
/// A failing step aborts and marks the cluster `Error`, unless the deletion
/// is forced, in which case the failure is logged and the next step runs.
pub struct DeleteClusterWorkflow {
    activities: Activities,
}

impl DeleteClusterWorkflow {
    pub fn new(activities: Activities) -> Self {
        Self { activities }
    }

    async fn fail(&self, ctx: &WorkflowContext, cluster_id: ClusterId, step: &str, error: &Error) {
        let marked = ctx
            .execute_activity(
                self.activities.set_status.as_ref(),
                SetClusterStatusInput::new(
                    cluster_id,
                    ClusterStatus::Error,
                    format!("failed to {step}: {error}"),
                ),
            )
            .await;
        if let Err(e) = marked {
            warn!(cluster_id, error = %e, "Could not mark cluster as failed");
        }
    }

    async fn step<F>(
        &self,
        ctx: &WorkflowContext,
        input: &DeleteClusterWorkflowInput,
        step: &str,
        execution: F,
    ) -> Result<()>
    where
        F: Future<Output = Result<()>> + Send,
    {
        match execution.await {
            Ok(()) => Ok(()),
            Err(e) if input.force => {
                warn!(
                    cluster_id = input.cluster_id,
                    step,
                    error = %e,
                    "Deletion step failed, continuing with forced deletion"
                );
                Ok(())
            }
            Err(e) => {
                self.fail(ctx, input.cluster_id, step, &e).await;
                Err(e)
            }
        }
    }
}

#[async_trait]
impl Workflow for DeleteClusterWorkflow {
    const NAME: &'static str = "delete-cluster";
    type Input = DeleteClusterWorkflowInput;
    type Output = ();

    async fn run(&self, ctx: &WorkflowContext, input: DeleteClusterWorkflowInput) -> Result<()> {
        let a = &self.activities;
        let cluster_id = input.cluster_id;

        self.step(
            ctx,
            &input,
            "delete kubernetes resources",
            ctx.execute_activity(a.delete_kubernetes_resources.as_ref(), cluster_id),
        )
        .await?;
        self.step(
            ctx,
            &input,
            "delete DNS records",
            ctx.execute_activity(
                a.delete_dns_records.as_ref(),
                DeleteDnsRecordsInput {
                    organization_id: input.organization_id,
                    cluster_uid: input.cluster_uid.clone(),
                },
            ),
        )
        .await?;
        self.step(
            ctx,
            &input,
            "delete infrastructure",
            ctx.execute_activity(a.delete_infrastructure.as_ref(), cluster_id),
        )
        .await?;
        self.step(
            ctx,
            &input,
            "delete unused secrets",
            ctx.execute_activity(a.delete_unused_secrets.as_ref(), cluster_id),
        )
        .await?;

        if let Err(e) = ctx
            .execute_activity(a.delete_record.as_ref(), cluster_id)
            .await
        {
            if !input.force {
                self.fail(ctx, cluster_id, "remove cluster record", &e).await;
            }
            return Err(e);
        }

        info!(cluster_id, force = input.force, "Cluster deleted");
        Ok(())
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::controller::context::Context;
use crate::controller::error::Result;
use crate::model::{Cluster, ClusterId, OrganizationId};
use crate::ports::ClusterRef;
use crate::posthook::AUTOSCALER_RELEASE;
use crate::workflow::Activity;

async fn existing_record(ctx: &Context, cluster_id: ClusterId) -> Result<Option<Cluster>> {
    match ctx.repository.get(cluster_id).await {
        Ok(record) => Ok(Some(record)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Remove in-cluster resources that hold cloud resources
pub struct DeleteKubernetesResources {
    ctx: Arc<Context>,
}

impl DeleteKubernetesResources {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Activity for DeleteKubernetesResources {
    const NAME: &'static str = "delete-kubernetes-resources";
    type Input = ClusterId;
    type Output = ();

    async fn execute(&self, cluster_id: ClusterId) -> Result<()> {
        let Some(record) = existing_record(&self.ctx, cluster_id).await? else {
            return Ok(());
        };
        if record.config_secret_id.is_none() {
            debug!(cluster_id, "Cluster never became reachable, skipping resource cleanup");
            return Ok(());
        }

        self.ctx
            .deployments
            .delete_deployment(
                cluster_id,
                AUTOSCALER_RELEASE,
                &self.ctx.config.kubernetes.system_namespace,
            )
            .await?;
        self.ctx
            .kubernetes
            .delete_user_resources(&ClusterRef::from(&record))
            .await
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteDnsRecordsInput {
    pub organization_id: OrganizationId,
    pub cluster_uid: String,
}

pub struct DeleteDnsRecords {
    ctx: Arc<Context>,
}

impl DeleteDnsRecords {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Activity for DeleteDnsRecords {
    const NAME: &'static str = "delete-dns-records";
    type Input = DeleteDnsRecordsInput;
    type Output = ();

    async fn execute(&self, input: DeleteDnsRecordsInput) -> Result<()> {
        self.ctx
            .dns
            .delete_records(input.organization_id, &input.cluster_uid)
            .await
    }
}

/// Delete the SSH and config secrets once no other cluster references them.
/// Cloud credentials belong to the user and are kept.
pub struct DeleteUnusedSecrets {
    ctx: Arc<Context>,
}

impl DeleteUnusedSecrets {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl Activity for DeleteUnusedSecrets {
    const NAME: &'static str = "delete-unused-secrets";
    type Input = ClusterId;
    type Output = ();

    async fn execute(&self, cluster_id: ClusterId) -> Result<()> {
        let Some(record) = existing_record(&self.ctx, cluster_id).await? else {
            return Ok(());
        };

        let owned = [record.ssh_secret_id.as_deref(), record.config_secret_id.as_deref()];
        for secret_id in owned.into_iter().flatten() {
            let users = self
                .ctx
                .repository
                .find_by_secret(record.organization_id, secret_id)
                .await?;
            if users.iter().any(|cluster| cluster.id != cluster_id) {
                debug!(cluster_id, secret_id, "Secret still in use, keeping it");
                continue;
            }
            self.ctx
                .secrets
                .delete(record.organization_id, secret_id)
                .await?;
            info!(cluster_id, secret_id, "Secret deleted");
        }
        Ok(())
    }
}

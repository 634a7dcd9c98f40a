//! State and behaviour shared by every backend entity.

use std::sync::Arc;

use async_trait::async_trait;
use jiff::Timestamp;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use super::{
    Identity, NodePoolAware, Persistent, Scalable, SecretBound, StatusTracker,
};
use crate::controller::error::{Error, Result};
use crate::controller::state_machine::ClusterStateMachine;
use crate::health::HealthState;
use crate::model::{
    Cloud, Cluster, ClusterId, ClusterStatus, ClusterStatusView, Distribution,
    InfrastructureState, NodePool, OrganizationId, ScaleOptions, StatusHistoryEntry, UserId,
};
use crate::ports::{ClusterRef, InfrastructureProvisioner};
use crate::secret::{KUBECONFIG_KEY, SecretItem, SecretStore, check_secret_type};
use crate::store::ClusterRepository;

/// Record plus the collaborators needed to read secrets and persist changes
pub struct ClusterBase {
    record: Cluster,
    repository: Arc<dyn ClusterRepository>,
    secrets: Arc<dyn SecretStore>,
    health_state: Option<Arc<HealthState>>,
    secret: OnceCell<SecretItem>,
    ssh_secret: OnceCell<SecretItem>,
}

impl ClusterBase {
    pub fn new(
        record: Cluster,
        repository: Arc<dyn ClusterRepository>,
        secrets: Arc<dyn SecretStore>,
        health_state: Option<Arc<HealthState>>,
    ) -> Self {
        Self {
            record,
            repository,
            secrets,
            health_state,
            secret: OnceCell::new(),
            ssh_secret: OnceCell::new(),
        }
    }

    pub fn record(&self) -> &Cluster {
        &self.record
    }

    /// Raw kubeconfig from the cluster's config secret
    pub async fn stored_kubeconfig(&self) -> Result<Vec<u8>> {
        let secret_id = self.record.config_secret_id.as_deref().ok_or_else(|| {
            Error::PreconditionFailed(format!(
                "cluster {} has no kubeconfig stored yet",
                self.record.name
            ))
        })?;
        let secret = self
            .secrets
            .get(self.record.organization_id, secret_id)
            .await?;
        secret
            .value(KUBECONFIG_KEY)
            .map(|config| config.as_bytes().to_vec())
            .ok_or_else(|| {
                Error::NotFound(format!("kubeconfig value in secret {secret_id}"))
            })
    }

    /// Kubeconfig fetched from the provider
    pub async fn download_kubeconfig(
        &self,
        provisioner: &dyn InfrastructureProvisioner,
    ) -> Result<Vec<u8>> {
        let config = provisioner.fetch_kubeconfig(&self.record).await?;
        if config.is_empty() {
            return Err(Error::internal(format!(
                "provider returned an empty kubeconfig for cluster {}",
                self.record.name
            )));
        }
        Ok(config)
    }

    /// API endpoint reported by provisioning
    pub fn reported_endpoint(&self) -> Result<String> {
        self.record
            .infrastructure
            .api_endpoint
            .clone()
            .ok_or_else(|| {
                Error::PreconditionFailed(format!(
                    "API endpoint of cluster {} is not known yet",
                    self.record.name
                ))
            })
    }

    async fn insert(&mut self, status: ClusterStatus, message: &str) -> Result<()> {
        self.record.status = status;
        self.record.status_message = message.to_string();
        self.record = self.repository.insert(self.record.clone()).await?;
        self.repository
            .append_status_history(StatusHistoryEntry {
                cluster_id: self.record.id,
                cluster_name: self.record.name.clone(),
                from_status: None,
                from_status_message: String::new(),
                to_status: status,
                to_status_message: message.to_string(),
                created_at: Timestamp::now(),
            })
            .await?;
        info!(
            cluster_id = self.record.id,
            organization_id = self.record.organization_id,
            cluster = %self.record.name,
            status = %status,
            "Cluster persisted"
        );
        Ok(())
    }

    pub async fn set_status(&mut self, status: ClusterStatus, message: &str) -> Result<()> {
        if self.record.id == 0 {
            return self.insert(status, message).await;
        }

        let from = self.record.status;
        if from == status {
            if self.record.status_message != message {
                self.record.status_message = message.to_string();
                self.repository.save(&self.record).await?;
            }
            return Ok(());
        }

        if !ClusterStateMachine::shared().allows(from, status) {
            return Err(Error::PreconditionFailed(format!(
                "cluster {} cannot move from {from} to {status}",
                self.record.name
            )));
        }

        self.repository
            .append_status_history(StatusHistoryEntry {
                cluster_id: self.record.id,
                cluster_name: self.record.name.clone(),
                from_status: Some(from),
                from_status_message: self.record.status_message.clone(),
                to_status: status,
                to_status_message: message.to_string(),
                created_at: Timestamp::now(),
            })
            .await?;

        if from == ClusterStatus::Creating && status.is_stable() && self.record.started_at.is_none()
        {
            self.record.started_at = Some(Timestamp::now());
        }
        self.record.status = status;
        self.record.status_message = message.to_string();
        self.repository.save(&self.record).await?;

        if let Some(state) = &self.health_state {
            state.metrics.record_transition(from, status);
        }
        info!(
            cluster_id = self.record.id,
            cluster = %self.record.name,
            from = %from,
            to = %status,
            message = %message,
            "Cluster status changed"
        );
        Ok(())
    }

    pub async fn persist(&mut self) -> Result<()> {
        if self.record.id == 0 {
            let (status, message) = (self.record.status, self.record.status_message.clone());
            return self.insert(status, &message).await;
        }
        debug!(cluster_id = self.record.id, "Saving cluster record");
        self.repository.save(&self.record).await
    }
}

/// Implemented by backend types that embed a [`ClusterBase`].
///
/// Grants the common traits through blanket implementations.
pub trait BackendCluster: Send + Sync {
    fn base(&self) -> &ClusterBase;
    fn base_mut(&mut self) -> &mut ClusterBase;
}

impl<T: BackendCluster> Identity for T {
    fn id(&self) -> ClusterId {
        self.base().record.id
    }

    fn uid(&self) -> &str {
        &self.base().record.uid
    }

    fn organization_id(&self) -> OrganizationId {
        self.base().record.organization_id
    }

    fn name(&self) -> &str {
        &self.base().record.name
    }

    fn cloud(&self) -> Cloud {
        self.base().record.cloud
    }

    fn distribution(&self) -> Distribution {
        self.base().record.distribution
    }

    fn location(&self) -> &str {
        &self.base().record.location
    }

    fn created_by(&self) -> UserId {
        self.base().record.created_by
    }

    fn cluster_ref(&self) -> ClusterRef {
        ClusterRef::from(&self.base().record)
    }
}

#[async_trait]
impl<T: BackendCluster> SecretBound for T {
    fn secret_id(&self) -> &str {
        &self.base().record.secret_id
    }

    fn ssh_secret_id(&self) -> Option<&str> {
        self.base().record.ssh_secret_id.as_deref()
    }

    fn config_secret_id(&self) -> Option<&str> {
        self.base().record.config_secret_id.as_deref()
    }

    fn set_ssh_secret_id(&mut self, secret_id: String) {
        let base = self.base_mut();
        base.record.ssh_secret_id = Some(secret_id);
        base.ssh_secret = OnceCell::new();
    }

    fn set_config_secret_id(&mut self, secret_id: String) {
        self.base_mut().record.config_secret_id = Some(secret_id);
    }

    async fn secret(&self) -> Result<SecretItem> {
        let base = self.base();
        let secret = base
            .secret
            .get_or_try_init(|| async {
                let secret = base
                    .secrets
                    .get(base.record.organization_id, &base.record.secret_id)
                    .await?;
                check_secret_type(&secret, base.record.cloud)?;
                Ok::<_, Error>(secret)
            })
            .await?;
        Ok(secret.clone())
    }

    async fn ssh_secret(&self) -> Result<Option<SecretItem>> {
        let base = self.base();
        let Some(secret_id) = base.record.ssh_secret_id.as_deref() else {
            return Ok(None);
        };
        let secret = base
            .ssh_secret
            .get_or_try_init(|| base.secrets.get(base.record.organization_id, secret_id))
            .await?;
        Ok(Some(secret.clone()))
    }
}

#[async_trait]
impl<T: BackendCluster> StatusTracker for T {
    fn status(&self) -> ClusterStatus {
        self.base().record.status
    }

    fn status_message(&self) -> &str {
        &self.base().record.status_message
    }

    fn started_at(&self) -> Option<Timestamp> {
        self.base().record.started_at
    }

    async fn set_status(&mut self, status: ClusterStatus, message: &str) -> Result<()> {
        self.base_mut().set_status(status, message).await
    }

    fn status_view(&self) -> ClusterStatusView {
        self.base().record.status_view()
    }
}

impl<T: BackendCluster> NodePoolAware for T {
    fn node_pools(&self) -> &[NodePool] {
        &self.base().record.node_pools
    }

    fn node_pool_exists(&self, name: &str) -> bool {
        self.base().record.node_pool(name).is_some()
    }

    fn set_node_pools(&mut self, pools: Vec<NodePool>) {
        self.base_mut().record.node_pools = pools;
    }
}

impl<T: BackendCluster> Scalable for T {
    fn scale_options(&self) -> Option<&ScaleOptions> {
        self.base().record.scale_options.as_ref()
    }

    fn set_scale_options(&mut self, options: Option<ScaleOptions>) {
        self.base_mut().record.scale_options = options;
    }
}

#[async_trait]
impl<T: BackendCluster> Persistent for T {
    fn record(&self) -> &Cluster {
        &self.base().record
    }

    fn set_infrastructure(&mut self, state: InfrastructureState) {
        self.base_mut().record.infrastructure = state;
    }

    async fn persist(&mut self) -> Result<()> {
        self.base_mut().persist().await
    }
}

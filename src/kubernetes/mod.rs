//! Kubernetes API adapters for managed clusters.
//!
//! Clients are built from the kubeconfig stored in each cluster's config
//! secret. [`KubeOps`] implements the [`crate::ports::KubernetesOps`] port on
//! top of them.

mod ops;
pub mod resources;

pub use ops::KubeOps;

use std::sync::Arc;

use async_trait::async_trait;
use kube::Client;
use kube::config::{KubeConfigOptions, Kubeconfig};

use crate::controller::error::{Error, Result};
use crate::model::OrganizationId;
use crate::ports::ClusterRef;
use crate::secret::{KUBECONFIG_KEY, SecretStore};

/// Build a client from a raw kubeconfig, using its current context
pub async fn client_from_kubeconfig(kubeconfig: &[u8]) -> Result<Client> {
    let text = std::str::from_utf8(kubeconfig)
        .map_err(|e| Error::InvalidRequest(format!("kubeconfig is not valid UTF-8: {e}")))?;
    let kubeconfig = Kubeconfig::from_yaml(text)?;
    let config = kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await?;
    Ok(Client::try_from(config)?)
}

/// Builds clients for managed clusters
#[async_trait]
pub trait KubeClientFactory: Send + Sync {
    /// Client for the kubeconfig held in a secret
    async fn from_secret(&self, organization_id: OrganizationId, secret_id: &str) -> Result<Client>;

    /// Client for a cluster through its config secret
    async fn for_cluster(&self, cluster: &ClusterRef) -> Result<Client> {
        let secret_id = cluster.config_secret_id.as_deref().ok_or_else(|| {
            Error::PreconditionFailed(format!("cluster {} has no kubeconfig stored", cluster.name))
        })?;
        self.from_secret(cluster.organization_id, secret_id).await
    }
}

/// Client factory reading kubeconfigs from the secret store
pub struct SecretKubeClientFactory {
    secrets: Arc<dyn SecretStore>,
}

impl SecretKubeClientFactory {
    pub fn new(secrets: Arc<dyn SecretStore>) -> Self {
        Self { secrets }
    }
}

#[async_trait]
impl KubeClientFactory for SecretKubeClientFactory {
    async fn from_secret(&self, organization_id: OrganizationId, secret_id: &str) -> Result<Client> {
        let secret = self.secrets.get(organization_id, secret_id).await?;
        let kubeconfig = secret.value(KUBECONFIG_KEY).ok_or_else(|| {
            Error::NotFound(format!("kubeconfig value in secret {secret_id}"))
        })?;
        client_from_kubeconfig(kubeconfig.as_bytes()).await
    }
}

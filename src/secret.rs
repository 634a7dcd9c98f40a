//! Secret store and secret validation ports.
//!
//! Credentials live in an external secret store. Clusters only hold secret
//! ids; values are fetched on demand and checked against the cloud the
//! cluster runs on.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::controller::error::{Error, Result};
use crate::model::{Cloud, OrganizationId, SecretType};

/// Key under which kubeconfig secrets store the raw config
pub const KUBECONFIG_KEY: &str = "kubeconfig";

/// A stored credential
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretItem {
    pub id: String,
    pub name: String,
    pub secret_type: SecretType,
    pub values: BTreeMap<String, String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl SecretItem {
    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

/// Secret storage
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, organization_id: OrganizationId, secret_id: &str) -> Result<SecretItem>;

    /// Store a cluster kubeconfig, returning the new secret id.
    ///
    /// Storing again for the same cluster name replaces the previous value.
    async fn store_kubeconfig(
        &self,
        organization_id: OrganizationId,
        cluster_name: &str,
        kubeconfig: &[u8],
    ) -> Result<String>;

    /// Generate an SSH key pair for cluster nodes, returning the secret id
    async fn create_ssh_key(
        &self,
        organization_id: OrganizationId,
        cluster_name: &str,
        cluster_uid: &str,
    ) -> Result<String>;

    /// Delete a secret. Deleting an absent secret is not an error.
    async fn delete(&self, organization_id: OrganizationId, secret_id: &str) -> Result<()>;
}

/// Checks that a secret holds credentials for a cloud
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SecretValidator: Send + Sync {
    async fn validate_secret_type(
        &self,
        organization_id: OrganizationId,
        secret_id: &str,
        cloud: Cloud,
    ) -> Result<()>;
}

/// Validate a secret already fetched from the store
pub fn check_secret_type(secret: &SecretItem, cloud: Cloud) -> Result<()> {
    let expected = SecretType::for_cloud(cloud);
    if secret.secret_type == expected {
        Ok(())
    } else {
        Err(Error::SecretTypeMismatch {
            secret_id: secret.id.clone(),
            expected,
            actual: secret.secret_type,
        })
    }
}

/// `SecretValidator` backed by a `SecretStore`
pub struct StoreSecretValidator {
    store: Arc<dyn SecretStore>,
}

impl StoreSecretValidator {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SecretValidator for StoreSecretValidator {
    async fn validate_secret_type(
        &self,
        organization_id: OrganizationId,
        secret_id: &str,
        cloud: Cloud,
    ) -> Result<()> {
        let secret = self.store.get(organization_id, secret_id).await?;
        check_secret_type(&secret, cloud)
    }
}

/// Pick the first candidate secret valid for the cloud.
///
/// Returns the last validation error when none match.
pub async fn validate_secrets(
    validator: &dyn SecretValidator,
    organization_id: OrganizationId,
    candidates: &[String],
    cloud: Cloud,
) -> Result<String> {
    let mut last_error = None;
    for secret_id in candidates {
        match validator
            .validate_secret_type(organization_id, secret_id, cloud)
            .await
        {
            Ok(()) => return Ok(secret_id.clone()),
            Err(e) => {
                debug!(secret_id = %secret_id, error = %e, "Secret rejected");
                last_error = Some(e);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| Error::InvalidRequest("no secret provided".to_string())))
}

/// Secret store kept in memory, keyed by secret name.
///
/// Used when embedding the engine without a vault and by tests. SSH keys
/// are recorded as placeholders; no key material is generated.
#[derive(Default)]
pub struct InMemorySecretStore {
    secrets: RwLock<BTreeMap<(OrganizationId, String), SecretItem>>,
}

impl InMemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a secret, replacing any secret with the same id
    pub async fn put(&self, organization_id: OrganizationId, secret: SecretItem) {
        self.secrets
            .write()
            .await
            .insert((organization_id, secret.id.clone()), secret);
    }

    pub async fn contains(&self, organization_id: OrganizationId, secret_id: &str) -> bool {
        self.secrets
            .read()
            .await
            .contains_key(&(organization_id, secret_id.to_string()))
    }

    async fn upsert_named(
        &self,
        organization_id: OrganizationId,
        name: String,
        secret_type: SecretType,
        values: BTreeMap<String, String>,
    ) -> String {
        let mut secrets = self.secrets.write().await;
        let id = name.clone();
        secrets.insert(
            (organization_id, id.clone()),
            SecretItem {
                id: id.clone(),
                name,
                secret_type,
                values,
                tags: vec!["cluster".to_string()],
            },
        );
        id
    }
}

#[async_trait]
impl SecretStore for InMemorySecretStore {
    async fn get(&self, organization_id: OrganizationId, secret_id: &str) -> Result<SecretItem> {
        self.secrets
            .read()
            .await
            .get(&(organization_id, secret_id.to_string()))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("secret {secret_id}")))
    }

    async fn store_kubeconfig(
        &self,
        organization_id: OrganizationId,
        cluster_name: &str,
        kubeconfig: &[u8],
    ) -> Result<String> {
        let config = String::from_utf8(kubeconfig.to_vec())
            .map_err(|e| Error::InvalidRequest(format!("kubeconfig is not UTF-8: {e}")))?;
        let values = BTreeMap::from([(KUBECONFIG_KEY.to_string(), config)]);
        Ok(self
            .upsert_named(
                organization_id,
                format!("{cluster_name}-kubeconfig"),
                SecretType::Kubernetes,
                values,
            )
            .await)
    }

    async fn create_ssh_key(
        &self,
        organization_id: OrganizationId,
        cluster_name: &str,
        cluster_uid: &str,
    ) -> Result<String> {
        let values = BTreeMap::from([("cluster_uid".to_string(), cluster_uid.to_string())]);
        Ok(self
            .upsert_named(
                organization_id,
                format!("{cluster_name}-ssh"),
                SecretType::Ssh,
                values,
            )
            .await)
    }

    async fn delete(&self, organization_id: OrganizationId, secret_id: &str) -> Result<()> {
        if self
            .secrets
            .write()
            .await
            .remove(&(organization_id, secret_id.to_string()))
            .is_none()
        {
            warn!(secret_id = %secret_id, "Secret already absent");
        }
        Ok(())
    }
}

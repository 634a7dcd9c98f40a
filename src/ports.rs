//! Ports to the systems the lifecycle engine drives.
//!
//! Cloud SDK calls, chart installation, DNS and error reporting sit behind
//! these traits so the orchestration stays independent of any provider.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::controller::error::{Error, Result};
use crate::model::{
    Cloud, Cluster, ClusterId, Distribution, InfrastructureState, NodePool, OrganizationId,
};

/// Identity of a cluster as seen by external systems
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRef {
    pub id: ClusterId,
    pub uid: String,
    pub organization_id: OrganizationId,
    pub name: String,
    pub cloud: Cloud,
    pub distribution: Distribution,
    pub location: String,
    pub config_secret_id: Option<String>,
}

impl From<&Cluster> for ClusterRef {
    fn from(cluster: &Cluster) -> Self {
        Self {
            id: cluster.id,
            uid: cluster.uid.clone(),
            organization_id: cluster.organization_id,
            name: cluster.name.clone(),
            cloud: cluster.cloud,
            distribution: cluster.distribution,
            location: cluster.location.clone(),
            config_secret_id: cluster.config_secret_id.clone(),
        }
    }
}

/// Cloud-side provisioning for one distribution.
///
/// Every call must be idempotent: workflow activities may repeat it.
#[async_trait]
pub trait InfrastructureProvisioner: Send + Sync {
    /// Create the control plane and networking, returning the outputs to persist
    async fn create_infrastructure(&self, cluster: &Cluster) -> Result<InfrastructureState>;

    async fn create_node_pool(&self, cluster: &Cluster, pool: &NodePool) -> Result<()>;

    async fn update_node_pool(&self, cluster: &Cluster, pool: &NodePool) -> Result<()>;

    async fn delete_node_pool(&self, cluster: &Cluster, pool_name: &str) -> Result<()>;

    /// Tear down everything created for the cluster
    async fn delete_infrastructure(&self, cluster: &Cluster) -> Result<()>;

    /// Download the admin kubeconfig from the provider
    async fn fetch_kubeconfig(&self, cluster: &Cluster) -> Result<Vec<u8>>;
}

/// Provisioners by distribution
#[derive(Default, Clone)]
pub struct ProvisionerRegistry {
    provisioners: HashMap<Distribution, Arc<dyn InfrastructureProvisioner>>,
}

impl ProvisionerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        mut self,
        distribution: Distribution,
        provisioner: Arc<dyn InfrastructureProvisioner>,
    ) -> Self {
        self.provisioners.insert(distribution, provisioner);
        self
    }

    pub fn get(&self, distribution: Distribution) -> Result<Arc<dyn InfrastructureProvisioner>> {
        self.provisioners
            .get(&distribution)
            .cloned()
            .ok_or_else(|| {
                Error::NotSupported(format!("no provisioner registered for {distribution}"))
            })
    }
}

/// A chart release scoped to one cluster
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSpec {
    pub cluster_id: ClusterId,
    pub organization_id: OrganizationId,
    pub namespace: String,
    pub chart_name: String,
    pub chart_version: Option<String>,
    pub release_name: String,
    pub values: serde_json::Value,
}

/// State of an installed release
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentInfo {
    pub release_name: String,
    pub namespace: String,
    pub chart_name: String,
    pub chart_version: String,
    pub status: String,
}

/// Chart installation on managed clusters
#[async_trait]
pub trait DeploymentManager: Send + Sync {
    /// Install or upgrade a release with exactly the given values
    async fn apply_deployment(&self, spec: &DeploymentSpec) -> Result<()>;

    /// Upgrade a release, merging the given values over the current ones
    async fn apply_deployment_reuse_values(&self, spec: &DeploymentSpec) -> Result<()>;

    /// Install a release that must not exist yet
    async fn install_deployment(&self, spec: &DeploymentSpec) -> Result<()>;

    /// Remove a release. Removing an absent release is not an error.
    async fn delete_deployment(
        &self,
        cluster_id: ClusterId,
        release_name: &str,
        namespace: &str,
    ) -> Result<()>;

    async fn get_deployment(
        &self,
        cluster_id: ClusterId,
        release_name: &str,
        namespace: &str,
    ) -> Result<Option<DeploymentInfo>>;
}

/// Subject bound to cluster-admin on backends that need explicit privileges
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSubject {
    pub kind: String,
    pub name: String,
}

impl RoleSubject {
    pub fn user(name: impl Into<String>) -> Self {
        Self {
            kind: "User".to_string(),
            name: name.into(),
        }
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self {
            kind: "Group".to_string(),
            name: name.into(),
        }
    }
}

/// Operations against the Kubernetes API of a managed cluster
#[async_trait]
pub trait KubernetesOps: Send + Sync {
    async fn ensure_namespace(
        &self,
        cluster: &ClusterRef,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<()>;

    async fn label_namespaces(
        &self,
        cluster: &ClusterRef,
        namespaces: &[String],
        labels: &BTreeMap<String, String>,
    ) -> Result<()>;

    async fn ensure_cluster_admin_binding(
        &self,
        cluster: &ClusterRef,
        subject: &RoleSubject,
    ) -> Result<()>;

    async fn label_nodes(
        &self,
        cluster: &ClusterRef,
        node_names: &[String],
        labels: &BTreeMap<String, String>,
    ) -> Result<()>;

    /// Apply desired labels per node pool through the label-set resources
    async fn sync_node_pool_labels(
        &self,
        cluster: &ClusterRef,
        namespace: &str,
        labels: &BTreeMap<String, BTreeMap<String, String>>,
    ) -> Result<()>;

    /// Remove workloads that hold cloud resources, such as load balancers
    async fn delete_user_resources(&self, cluster: &ClusterRef) -> Result<()>;
}

/// Source of provider metadata labels for node pools
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LabelSource: Send + Sync {
    async fn get_labels(
        &self,
        cloud: Cloud,
        distribution: Distribution,
        region: &str,
        instance_type: &str,
    ) -> Result<BTreeMap<String, String>>;
}

/// Label source that never adds labels
pub struct NoExternalLabels;

#[async_trait]
impl LabelSource for NoExternalLabels {
    async fn get_labels(
        &self,
        _cloud: Cloud,
        _distribution: Distribution,
        _region: &str,
        _instance_type: &str,
    ) -> Result<BTreeMap<String, String>> {
        Ok(BTreeMap::new())
    }
}

/// DNS records owned by clusters
#[cfg_attr(test, automock)]
#[async_trait]
pub trait DnsManager: Send + Sync {
    async fn delete_records(
        &self,
        organization_id: OrganizationId,
        cluster_uid: &str,
    ) -> Result<()>;
}

/// Receives failures from background execution paths
pub trait ErrorHandler: Send + Sync {
    fn handle(&self, error: &Error);
}

/// Reports errors through tracing
pub struct LogErrorHandler;

impl ErrorHandler for LogErrorHandler {
    fn handle(&self, error: &Error) {
        error!(error = %error, reason = error.reason(), "Background operation failed");
    }
}

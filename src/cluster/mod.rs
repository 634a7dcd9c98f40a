//! Cluster entities.
//!
//! One concrete type per backend. Each implements a set of narrow traits
//! that callers depend on individually, combined in [`CommonCluster`].
//! Behaviour only some backends have is exposed through capability traits
//! discovered with the `as_*` methods, so orchestration code never branches
//! on the distribution tag.

mod aks;
mod base;
mod eks;
mod gke;
pub mod kubeconfig;
mod oke;
mod self_hosted;

pub use aks::AksCluster;
pub use base::{BackendCluster, ClusterBase};
pub use eks::EksCluster;
pub use gke::GkeCluster;
pub use oke::OkeCluster;
pub use self_hosted::SelfHostedCluster;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use jiff::Timestamp;

use crate::controller::error::{Error, Result};
use crate::health::HealthState;
use crate::model::{
    Cloud, Cluster, ClusterId, ClusterStatus, ClusterStatusView, Distribution,
    InfrastructureState, NodePool, NodePoolDiff, OrganizationId, ScaleOptions, UserId,
};
use crate::ports::{ClusterRef, InfrastructureProvisioner, RoleSubject};
use crate::secret::{SecretItem, SecretStore};
use crate::store::ClusterRepository;

/// Identity accessors
pub trait Identity: Send + Sync {
    fn id(&self) -> ClusterId;
    fn uid(&self) -> &str;
    fn organization_id(&self) -> OrganizationId;
    fn name(&self) -> &str;
    fn cloud(&self) -> Cloud;
    fn distribution(&self) -> Distribution;
    fn location(&self) -> &str;
    fn created_by(&self) -> UserId;
    fn cluster_ref(&self) -> ClusterRef;
}

/// Secret references and validated secret retrieval
#[async_trait]
pub trait SecretBound: Send + Sync {
    fn secret_id(&self) -> &str;
    fn ssh_secret_id(&self) -> Option<&str>;
    fn config_secret_id(&self) -> Option<&str>;
    fn set_ssh_secret_id(&mut self, secret_id: String);
    fn set_config_secret_id(&mut self, secret_id: String);

    /// Cloud credentials. Fetched once, then cached.
    ///
    /// Fails with `SecretTypeMismatch` if the secret is not for the cluster's cloud.
    async fn secret(&self) -> Result<SecretItem>;

    async fn ssh_secret(&self) -> Result<Option<SecretItem>>;
}

/// Status access with history recording
#[async_trait]
pub trait StatusTracker: Send + Sync {
    fn status(&self) -> ClusterStatus;
    fn status_message(&self) -> &str;
    fn started_at(&self) -> Option<Timestamp>;

    /// Move to a new status, writing history first.
    ///
    /// Persists the record, inserting it when it has no id yet.
    async fn set_status(&mut self, status: ClusterStatus, message: &str) -> Result<()>;

    fn status_view(&self) -> ClusterStatusView;
}

pub trait NodePoolAware: Send + Sync {
    fn node_pools(&self) -> &[NodePool];
    fn node_pool_exists(&self, name: &str) -> bool;
    /// Replace the whole pool set
    fn set_node_pools(&mut self, pools: Vec<NodePool>);
}

pub trait Scalable: Send + Sync {
    fn scale_options(&self) -> Option<&ScaleOptions>;
    fn set_scale_options(&mut self, options: Option<ScaleOptions>);
}

/// Access to the cluster's Kubernetes API
#[async_trait]
pub trait KubeconfigProvider: Send + Sync {
    async fn api_endpoint(&self) -> Result<String>;

    /// Admin kubeconfig
    async fn kubeconfig(&self) -> Result<Vec<u8>>;

    /// Kubeconfig handed to cluster users
    async fn user_kubeconfig(&self) -> Result<Vec<u8>> {
        self.kubeconfig().await
    }
}

/// Direct create and update entrypoints.
///
/// Built-in backends run their flows as workflows and leave these
/// unsupported; callers fall back to the workflows on `NotSupported`.
/// Deletion always runs the delete workflow.
#[async_trait]
pub trait Lifecycle: Send + Sync {
    async fn create(&mut self) -> Result<()> {
        Err(Error::NotSupported("direct create".to_string()))
    }

    async fn update(&mut self, _changes: &NodePoolDiff) -> Result<()> {
        Err(Error::NotSupported("direct update".to_string()))
    }
}

/// Record access and persistence
#[async_trait]
pub trait Persistent: Send + Sync {
    fn record(&self) -> &Cluster;
    fn set_infrastructure(&mut self, state: InfrastructureState);
    /// Write the record, inserting it when it has no id yet
    async fn persist(&mut self) -> Result<()>;
}

/// Backends whose control plane lives in an Azure-style resource group
pub trait ResourceGroupAware: Send + Sync {
    fn resource_group_name(&self) -> &str;
}

/// Backends that cannot label nodes through their control API and report
/// node names per pool so they can be labeled out of band
pub trait NodeNameLister: Send + Sync {
    fn node_names(&self) -> BTreeMap<String, Vec<String>>;
}

/// Backends whose kubeconfig is downloaded from the provider rather than generated
#[async_trait]
pub trait ConfigDownloader: Send + Sync {
    async fn download_kubeconfig(
        &self,
        provisioner: &dyn InfrastructureProvisioner,
    ) -> Result<Vec<u8>>;
}

/// Backends that need an explicit cluster-admin binding after creation
pub trait PrivilegedAccess: Send + Sync {
    fn admin_subjects(&self) -> Vec<RoleSubject>;
}

/// A cluster of any backend
pub trait CommonCluster:
    Identity
    + SecretBound
    + StatusTracker
    + NodePoolAware
    + Scalable
    + KubeconfigProvider
    + Lifecycle
    + Persistent
{
    fn as_resource_group_aware(&self) -> Option<&dyn ResourceGroupAware> {
        None
    }

    fn as_node_name_lister(&self) -> Option<&dyn NodeNameLister> {
        None
    }

    fn as_config_downloader(&self) -> Option<&dyn ConfigDownloader> {
        None
    }

    fn as_privileged_access(&self) -> Option<&dyn PrivilegedAccess> {
        None
    }
}

/// Builds backend entities from persisted records
#[derive(Clone)]
pub struct ClusterFactory {
    repository: Arc<dyn ClusterRepository>,
    secrets: Arc<dyn SecretStore>,
    health_state: Option<Arc<HealthState>>,
}

impl ClusterFactory {
    pub fn new(
        repository: Arc<dyn ClusterRepository>,
        secrets: Arc<dyn SecretStore>,
        health_state: Option<Arc<HealthState>>,
    ) -> Self {
        Self {
            repository,
            secrets,
            health_state,
        }
    }

    /// Wrap a record in the entity type of its distribution
    pub fn build(&self, record: Cluster) -> Result<Box<dyn CommonCluster>> {
        let distribution = record.distribution;
        if record.backend.distribution() != distribution {
            return Err(Error::InvalidRequest(format!(
                "backend configuration for {} does not match distribution {distribution}",
                record.backend.distribution()
            )));
        }
        if !distribution.supports(record.cloud) {
            return Err(Error::InvalidRequest(format!(
                "distribution {distribution} does not run on {}",
                record.cloud
            )));
        }

        let base = ClusterBase::new(
            record,
            self.repository.clone(),
            self.secrets.clone(),
            self.health_state.clone(),
        );
        Ok(match distribution {
            Distribution::Eks => Box::new(EksCluster::new(base)),
            Distribution::Aks => Box::new(AksCluster::new(base)),
            Distribution::Gke => Box::new(GkeCluster::new(base)),
            Distribution::Oke => Box::new(OkeCluster::new(base)),
            Distribution::SelfHosted => Box::new(SelfHostedCluster::new(base)),
        })
    }

    /// Load a record by id and build its entity
    pub async fn load(&self, cluster_id: ClusterId) -> Result<Box<dyn CommonCluster>> {
        let record = self.repository.get(cluster_id).await?;
        self.build(record)
    }

    /// Load a record scoped to an organization and build its entity
    pub async fn load_in(
        &self,
        organization_id: OrganizationId,
        cluster_id: ClusterId,
    ) -> Result<Box<dyn CommonCluster>> {
        let record = self
            .repository
            .find_one_by_id(organization_id, cluster_id)
            .await?;
        self.build(record)
    }
}

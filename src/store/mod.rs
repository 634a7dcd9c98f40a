//! Persistence port for cluster records and their status history.

mod memory;

pub use memory::InMemoryClusterStore;

use async_trait::async_trait;

use crate::controller::error::Result;
use crate::model::{Cluster, ClusterId, OrganizationId, StatusHistoryEntry};

/// Cluster persistence.
///
/// Lookups return `Error::NotFound` for missing or deleted clusters.
#[async_trait]
pub trait ClusterRepository: Send + Sync {
    /// Whether a live cluster with this name exists in the organization
    async fn exists(&self, organization_id: OrganizationId, name: &str) -> Result<bool>;

    async fn find_one_by_id(
        &self,
        organization_id: OrganizationId,
        cluster_id: ClusterId,
    ) -> Result<Cluster>;

    async fn find_one_by_name(&self, organization_id: OrganizationId, name: &str)
    -> Result<Cluster>;

    async fn find_by_organization(&self, organization_id: OrganizationId) -> Result<Vec<Cluster>>;

    /// Clusters referencing the secret as cloud, SSH or config secret
    async fn find_by_secret(
        &self,
        organization_id: OrganizationId,
        secret_id: &str,
    ) -> Result<Vec<Cluster>>;

    /// Every live cluster across organizations
    async fn all(&self) -> Result<Vec<Cluster>>;

    /// Lookup without organization scoping, for background controllers
    async fn get(&self, cluster_id: ClusterId) -> Result<Cluster>;

    /// Insert a new record, assigning its id and, if empty, its uid
    async fn insert(&self, cluster: Cluster) -> Result<Cluster>;

    /// Overwrite an existing record
    async fn save(&self, cluster: &Cluster) -> Result<()>;

    /// Remove a record. Removing an absent record is not an error.
    async fn delete(&self, cluster_id: ClusterId) -> Result<()>;

    async fn append_status_history(&self, entry: StatusHistoryEntry) -> Result<()>;

    /// History entries for a cluster, oldest first
    async fn status_history(&self, cluster_id: ClusterId) -> Result<Vec<StatusHistoryEntry>>;
}

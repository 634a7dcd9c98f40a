use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::ClusterRepository;
use crate::controller::error::{Error, Result};
use crate::model::{Cluster, ClusterId, OrganizationId, StatusHistoryEntry};

/// Repository kept entirely in memory.
///
/// History survives record deletion, matching an append-only audit table.
#[derive(Default)]
pub struct InMemoryClusterStore {
    clusters: RwLock<BTreeMap<ClusterId, Cluster>>,
    history: RwLock<Vec<StatusHistoryEntry>>,
    next_id: AtomicU64,
}

impl InMemoryClusterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live records
    pub async fn len(&self) -> usize {
        self.clusters.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clusters.read().await.is_empty()
    }
}

fn not_found(cluster_id: ClusterId) -> Error {
    Error::NotFound(format!("cluster {cluster_id}"))
}

fn references_secret(cluster: &Cluster, secret_id: &str) -> bool {
    cluster.secret_id == secret_id
        || cluster.ssh_secret_id.as_deref() == Some(secret_id)
        || cluster.config_secret_id.as_deref() == Some(secret_id)
}

#[async_trait]
impl ClusterRepository for InMemoryClusterStore {
    async fn exists(&self, organization_id: OrganizationId, name: &str) -> Result<bool> {
        Ok(self
            .clusters
            .read()
            .await
            .values()
            .any(|c| c.organization_id == organization_id && c.name == name))
    }

    async fn find_one_by_id(
        &self,
        organization_id: OrganizationId,
        cluster_id: ClusterId,
    ) -> Result<Cluster> {
        self.clusters
            .read()
            .await
            .get(&cluster_id)
            .filter(|c| c.organization_id == organization_id)
            .cloned()
            .ok_or_else(|| not_found(cluster_id))
    }

    async fn find_one_by_name(
        &self,
        organization_id: OrganizationId,
        name: &str,
    ) -> Result<Cluster> {
        self.clusters
            .read()
            .await
            .values()
            .find(|c| c.organization_id == organization_id && c.name == name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("cluster {name:?}")))
    }

    async fn find_by_organization(&self, organization_id: OrganizationId) -> Result<Vec<Cluster>> {
        Ok(self
            .clusters
            .read()
            .await
            .values()
            .filter(|c| c.organization_id == organization_id)
            .cloned()
            .collect())
    }

    async fn find_by_secret(
        &self,
        organization_id: OrganizationId,
        secret_id: &str,
    ) -> Result<Vec<Cluster>> {
        Ok(self
            .clusters
            .read()
            .await
            .values()
            .filter(|c| c.organization_id == organization_id && references_secret(c, secret_id))
            .cloned()
            .collect())
    }

    async fn all(&self) -> Result<Vec<Cluster>> {
        Ok(self.clusters.read().await.values().cloned().collect())
    }

    async fn get(&self, cluster_id: ClusterId) -> Result<Cluster> {
        self.clusters
            .read()
            .await
            .get(&cluster_id)
            .cloned()
            .ok_or_else(|| not_found(cluster_id))
    }

    async fn insert(&self, mut cluster: Cluster) -> Result<Cluster> {
        let mut clusters = self.clusters.write().await;
        if clusters
            .values()
            .any(|c| c.organization_id == cluster.organization_id && c.name == cluster.name)
        {
            return Err(Error::AlreadyExists {
                organization_id: cluster.organization_id,
                name: cluster.name,
            });
        }

        cluster.id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        if cluster.uid.is_empty() {
            cluster.uid = Uuid::new_v4().to_string();
        }
        debug!(cluster_id = cluster.id, uid = %cluster.uid, "Inserted cluster record");
        clusters.insert(cluster.id, cluster.clone());
        Ok(cluster)
    }

    async fn save(&self, cluster: &Cluster) -> Result<()> {
        let mut clusters = self.clusters.write().await;
        match clusters.get_mut(&cluster.id) {
            Some(existing) => {
                *existing = cluster.clone();
                Ok(())
            }
            None => Err(not_found(cluster.id)),
        }
    }

    async fn delete(&self, cluster_id: ClusterId) -> Result<()> {
        if self.clusters.write().await.remove(&cluster_id).is_some() {
            debug!(cluster_id, "Removed cluster record");
        }
        Ok(())
    }

    async fn append_status_history(&self, entry: StatusHistoryEntry) -> Result<()> {
        self.history.write().await.push(entry);
        Ok(())
    }

    async fn status_history(&self, cluster_id: ClusterId) -> Result<Vec<StatusHistoryEntry>> {
        Ok(self
            .history
            .read()
            .await
            .iter()
            .filter(|e| e.cluster_id == cluster_id)
            .cloned()
            .collect())
    }
}

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, Node, PersistentVolumeClaim, Service};
use k8s_openapi::api::rbac::v1::ClusterRoleBinding;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, Patch, PatchParams};
use kube::{Client, ResourceExt};
use tracing::{debug, info};

use super::KubeClientFactory;
use super::resources::{
    cluster_admin_binding, label_patch, label_set_resource, namespace, node_pool_label_set,
};
use crate::controller::error::{Error, Result};
use crate::ports::{ClusterRef, KubernetesOps, RoleSubject};

/// Namespaces whose workloads are never removed on deletion
const SYSTEM_NAMESPACES: &[&str] = &["kube-system", "kube-public", "kube-node-lease"];

/// `KubernetesOps` against live clusters
pub struct KubeOps {
    clients: Arc<dyn KubeClientFactory>,
    field_manager: String,
}

impl KubeOps {
    pub fn new(clients: Arc<dyn KubeClientFactory>, field_manager: impl Into<String>) -> Self {
        Self {
            clients,
            field_manager: field_manager.into(),
        }
    }

    async fn client(&self, cluster: &ClusterRef) -> Result<Client> {
        self.clients.for_cluster(cluster).await
    }

    fn apply_params(&self) -> PatchParams {
        PatchParams::apply(&self.field_manager).force()
    }
}

/// Treat a missing object as already deleted
fn ignore_not_found<T>(result: std::result::Result<T, kube::Error>) -> Result<()> {
    match result.map_err(Error::from) {
        Ok(_) => Ok(()),
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(e),
    }
}

#[async_trait]
impl KubernetesOps for KubeOps {
    async fn ensure_namespace(
        &self,
        cluster: &ClusterRef,
        name: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<()> {
        let api: Api<Namespace> = Api::all(self.client(cluster).await?);
        api.patch(name, &self.apply_params(), &Patch::Apply(&namespace(name, labels)))
            .await?;
        debug!(cluster_id = cluster.id, namespace = %name, "Namespace applied");
        Ok(())
    }

    async fn label_namespaces(
        &self,
        cluster: &ClusterRef,
        namespaces: &[String],
        labels: &BTreeMap<String, String>,
    ) -> Result<()> {
        let api: Api<Namespace> = Api::all(self.client(cluster).await?);
        let patch = label_patch(labels);
        for name in namespaces {
            api.patch(name, &PatchParams::default(), &Patch::Merge(&patch))
                .await?;
        }
        Ok(())
    }

    async fn ensure_cluster_admin_binding(
        &self,
        cluster: &ClusterRef,
        subject: &RoleSubject,
    ) -> Result<()> {
        let binding = cluster_admin_binding(subject);
        let name = binding.name_any();
        let api: Api<ClusterRoleBinding> = Api::all(self.client(cluster).await?);
        api.patch(&name, &self.apply_params(), &Patch::Apply(&binding))
            .await?;
        info!(cluster_id = cluster.id, binding = %name, "Cluster admin binding applied");
        Ok(())
    }

    async fn label_nodes(
        &self,
        cluster: &ClusterRef,
        node_names: &[String],
        labels: &BTreeMap<String, String>,
    ) -> Result<()> {
        let api: Api<Node> = Api::all(self.client(cluster).await?);
        let patch = label_patch(labels);
        for node in node_names {
            api.patch(node, &PatchParams::default(), &Patch::Merge(&patch))
                .await?;
        }
        Ok(())
    }

    async fn sync_node_pool_labels(
        &self,
        cluster: &ClusterRef,
        namespace: &str,
        labels: &BTreeMap<String, BTreeMap<String, String>>,
    ) -> Result<()> {
        let api: Api<DynamicObject> = Api::namespaced_with(
            self.client(cluster).await?,
            namespace,
            &label_set_resource(),
        );
        for (pool, pool_labels) in labels {
            let object = node_pool_label_set(namespace, pool, pool_labels);
            api.patch(pool, &self.apply_params(), &Patch::Apply(&object))
                .await?;
        }
        debug!(
            cluster_id = cluster.id,
            pools = labels.len(),
            "Node pool label sets applied"
        );
        Ok(())
    }

    async fn delete_user_resources(&self, cluster: &ClusterRef) -> Result<()> {
        let client = self.client(cluster).await?;

        let services: Api<Service> = Api::all(client.clone());
        for service in services.list(&ListParams::default()).await? {
            let is_load_balancer = service
                .spec
                .as_ref()
                .and_then(|spec| spec.type_.as_deref())
                == Some("LoadBalancer");
            let Some(ns) = service.namespace() else {
                continue;
            };
            if !is_load_balancer || SYSTEM_NAMESPACES.contains(&ns.as_str()) {
                continue;
            }
            let api: Api<Service> = Api::namespaced(client.clone(), &ns);
            ignore_not_found(api.delete(&service.name_any(), &DeleteParams::default()).await)?;
            debug!(
                cluster_id = cluster.id,
                namespace = %ns,
                service = %service.name_any(),
                "Load balancer removed"
            );
        }

        let claims: Api<PersistentVolumeClaim> = Api::all(client.clone());
        for claim in claims.list(&ListParams::default()).await? {
            let Some(ns) = claim.namespace() else {
                continue;
            };
            if SYSTEM_NAMESPACES.contains(&ns.as_str()) {
                continue;
            }
            let api: Api<PersistentVolumeClaim> = Api::namespaced(client.clone(), &ns);
            ignore_not_found(api.delete(&claim.name_any(), &DeleteParams::default()).await)?;
        }

        info!(cluster_id = cluster.id, "User resources removed");
        Ok(())
    }
}

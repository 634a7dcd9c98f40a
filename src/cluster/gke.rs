use async_trait::async_trait;

use super::kubeconfig::{ExecPlugin, KubeconfigTemplate, render};
use super::{BackendCluster, ClusterBase, CommonCluster, KubeconfigProvider, Lifecycle};
use crate::controller::error::Result;

/// Google GKE cluster
pub struct GkeCluster {
    base: ClusterBase,
}

impl GkeCluster {
    pub fn new(base: ClusterBase) -> Self {
        Self { base }
    }
}

impl BackendCluster for GkeCluster {
    fn base(&self) -> &ClusterBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ClusterBase {
        &mut self.base
    }
}

#[async_trait]
impl KubeconfigProvider for GkeCluster {
    async fn api_endpoint(&self) -> Result<String> {
        self.base.reported_endpoint()
    }

    async fn kubeconfig(&self) -> Result<Vec<u8>> {
        let endpoint = self.base.reported_endpoint()?;
        let record = self.base.record();
        let mut exec = ExecPlugin::new("gke-gcloud-auth-plugin", &[]);
        exec.provide_cluster_info = true;
        render(&KubeconfigTemplate {
            cluster_name: &record.name,
            endpoint: &endpoint,
            certificate_authority: record.infrastructure.certificate_authority.as_deref(),
            user: &format!("{}-admin", record.name),
            exec,
        })
    }
}

impl Lifecycle for GkeCluster {}

impl CommonCluster for GkeCluster {}

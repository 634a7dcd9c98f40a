use async_trait::async_trait;

use super::{
    BackendCluster, ClusterBase, CommonCluster, ConfigDownloader, KubeconfigProvider, Lifecycle,
    ResourceGroupAware,
};
use crate::controller::error::Result;
use crate::model::BackendSpec;
use crate::ports::InfrastructureProvisioner;

/// Azure AKS cluster
pub struct AksCluster {
    base: ClusterBase,
}

impl AksCluster {
    pub fn new(base: ClusterBase) -> Self {
        Self { base }
    }
}

impl BackendCluster for AksCluster {
    fn base(&self) -> &ClusterBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ClusterBase {
        &mut self.base
    }
}

#[async_trait]
impl KubeconfigProvider for AksCluster {
    async fn api_endpoint(&self) -> Result<String> {
        self.base.reported_endpoint()
    }

    async fn kubeconfig(&self) -> Result<Vec<u8>> {
        self.base.stored_kubeconfig().await
    }
}

impl Lifecycle for AksCluster {}

impl ResourceGroupAware for AksCluster {
    fn resource_group_name(&self) -> &str {
        match &self.base.record().backend {
            BackendSpec::Aks(spec) => &spec.resource_group,
            _ => "",
        }
    }
}

#[async_trait]
impl ConfigDownloader for AksCluster {
    async fn download_kubeconfig(
        &self,
        provisioner: &dyn InfrastructureProvisioner,
    ) -> Result<Vec<u8>> {
        self.base.download_kubeconfig(provisioner).await
    }
}

impl CommonCluster for AksCluster {
    fn as_resource_group_aware(&self) -> Option<&dyn ResourceGroupAware> {
        Some(self)
    }

    fn as_config_downloader(&self) -> Option<&dyn ConfigDownloader> {
        Some(self)
    }
}

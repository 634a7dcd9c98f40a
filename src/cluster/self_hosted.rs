use std::collections::BTreeMap;

use async_trait::async_trait;

use super::{
    BackendCluster, ClusterBase, CommonCluster, ConfigDownloader, KubeconfigProvider, Lifecycle,
    NodeNameLister,
};
use crate::controller::error::Result;
use crate::ports::InfrastructureProvisioner;

/// Self-hosted Kubernetes on cloud virtual machines
pub struct SelfHostedCluster {
    base: ClusterBase,
}

impl SelfHostedCluster {
    pub fn new(base: ClusterBase) -> Self {
        Self { base }
    }
}

impl BackendCluster for SelfHostedCluster {
    fn base(&self) -> &ClusterBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ClusterBase {
        &mut self.base
    }
}

#[async_trait]
impl KubeconfigProvider for SelfHostedCluster {
    async fn api_endpoint(&self) -> Result<String> {
        self.base.reported_endpoint()
    }

    async fn kubeconfig(&self) -> Result<Vec<u8>> {
        self.base.stored_kubeconfig().await
    }
}

impl Lifecycle for SelfHostedCluster {}

impl NodeNameLister for SelfHostedCluster {
    fn node_names(&self) -> BTreeMap<String, Vec<String>> {
        self.base.record().infrastructure.node_names.clone()
    }
}

#[async_trait]
impl ConfigDownloader for SelfHostedCluster {
    async fn download_kubeconfig(
        &self,
        provisioner: &dyn InfrastructureProvisioner,
    ) -> Result<Vec<u8>> {
        self.base.download_kubeconfig(provisioner).await
    }
}

impl CommonCluster for SelfHostedCluster {
    fn as_node_name_lister(&self) -> Option<&dyn NodeNameLister> {
        Some(self)
    }

    fn as_config_downloader(&self) -> Option<&dyn ConfigDownloader> {
        Some(self)
    }
}

use async_trait::async_trait;

use super::kubeconfig::{ExecPlugin, KubeconfigTemplate, render};
use super::{BackendCluster, ClusterBase, CommonCluster, KubeconfigProvider, Lifecycle};
use crate::controller::error::{Error, Result};

/// Oracle OKE cluster
pub struct OkeCluster {
    base: ClusterBase,
}

impl OkeCluster {
    pub fn new(base: ClusterBase) -> Self {
        Self { base }
    }
}

impl BackendCluster for OkeCluster {
    fn base(&self) -> &ClusterBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ClusterBase {
        &mut self.base
    }
}

#[async_trait]
impl KubeconfigProvider for OkeCluster {
    async fn api_endpoint(&self) -> Result<String> {
        self.base.reported_endpoint()
    }

    async fn kubeconfig(&self) -> Result<Vec<u8>> {
        let endpoint = self.base.reported_endpoint()?;
        let record = self.base.record();
        // tokens are issued per OCI cluster OCID, not per name
        let cluster_ocid = record.infrastructure.provider_id.as_deref().ok_or_else(|| {
            Error::PreconditionFailed(format!("cluster {} has no OCID yet", record.name))
        })?;
        let exec = ExecPlugin::new(
            "oci",
            &[
                "ce",
                "cluster",
                "generate-token",
                "--cluster-id",
                cluster_ocid,
                "--region",
                &record.location,
            ],
        );
        render(&KubeconfigTemplate {
            cluster_name: &record.name,
            endpoint: &endpoint,
            certificate_authority: record.infrastructure.certificate_authority.as_deref(),
            user: &format!("{}-admin", record.name),
            exec,
        })
    }
}

impl Lifecycle for OkeCluster {}

impl CommonCluster for OkeCluster {}

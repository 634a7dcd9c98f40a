use async_trait::async_trait;

use super::kubeconfig::{ExecPlugin, KubeconfigTemplate, render};
use super::{
    BackendCluster, ClusterBase, CommonCluster, Identity, KubeconfigProvider, Lifecycle,
    PrivilegedAccess,
};
use crate::controller::error::Result;
use crate::model::{BackendSpec, EksSpec};
use crate::ports::RoleSubject;

/// Group bound to cluster-admin when no admin identity is configured
pub const DEFAULT_ADMIN_GROUP: &str = "lifecycle:cluster-admins";

/// Amazon EKS cluster
pub struct EksCluster {
    base: ClusterBase,
}

impl EksCluster {
    pub fn new(base: ClusterBase) -> Self {
        Self { base }
    }

    fn spec(&self) -> Option<&EksSpec> {
        match &self.base.record().backend {
            BackendSpec::Eks(spec) => Some(spec),
            _ => None,
        }
    }
}

impl BackendCluster for EksCluster {
    fn base(&self) -> &ClusterBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut ClusterBase {
        &mut self.base
    }
}

#[async_trait]
impl KubeconfigProvider for EksCluster {
    async fn api_endpoint(&self) -> Result<String> {
        self.base.reported_endpoint()
    }

    async fn kubeconfig(&self) -> Result<Vec<u8>> {
        let endpoint = self.base.reported_endpoint()?;
        let record = self.base.record();
        let mut exec = ExecPlugin::new(
            "aws",
            &[
                "eks",
                "get-token",
                "--cluster-name",
                &record.name,
                "--region",
                &record.location,
            ],
        );
        exec.env
            .insert("AWS_STS_REGIONAL_ENDPOINTS".into(), "regional".into());
        render(&KubeconfigTemplate {
            cluster_name: &record.name,
            endpoint: &endpoint,
            certificate_authority: record.infrastructure.certificate_authority.as_deref(),
            user: &format!("{}-admin", record.name),
            exec,
        })
    }
}

impl Lifecycle for EksCluster {}

/// EKS maps IAM identities to Kubernetes users; only the creator is admin
/// until a binding exists.
impl PrivilegedAccess for EksCluster {
    fn admin_subjects(&self) -> Vec<RoleSubject> {
        match self.spec().and_then(|s| s.admin_identity.as_deref()) {
            Some(identity) => vec![RoleSubject::user(identity)],
            None => vec![RoleSubject::group(DEFAULT_ADMIN_GROUP)],
        }
    }
}

impl CommonCluster for EksCluster {
    fn as_privileged_access(&self) -> Option<&dyn PrivilegedAccess> {
        Some(self)
    }
}

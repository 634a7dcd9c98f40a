//! Fixtures shared by unit tests.

use jiff::Timestamp;

use crate::model::{
    BackendSpec, Cloud, Cluster, ClusterStatus, Distribution, EksSpec, InfrastructureState,
    NodePool, OrganizationId,
};

/// Unsaved EKS cluster in us-east-1 with a single worker pool
pub fn sample_cluster(organization_id: OrganizationId, name: &str) -> Cluster {
    Cluster {
        id: 0,
        uid: String::new(),
        organization_id,
        name: name.to_string(),
        cloud: Cloud::Amazon,
        distribution: Distribution::Eks,
        location: "us-east-1".to_string(),
        status: ClusterStatus::Creating,
        status_message: String::new(),
        secret_id: "aws-secret".to_string(),
        ssh_secret_id: None,
        config_secret_id: None,
        rbac_enabled: true,
        scale_options: None,
        ttl_minutes: 0,
        started_at: None,
        created_at: Timestamp::now(),
        created_by: 7,
        node_pools: vec![NodePool::new("pool1", "m5.large", 2)],
        backend: BackendSpec::Eks(EksSpec {
            kubernetes_version: "1.30".to_string(),
            ..Default::default()
        }),
        infrastructure: InfrastructureState::default(),
    }
}

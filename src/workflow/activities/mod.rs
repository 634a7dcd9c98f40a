//! Activities used by the lifecycle workflows.
//!
//! Each activity reloads what it needs from the repository instead of
//! trusting state captured when the workflow started, so a retried or
//! repeated execution sees the latest record.

mod cluster;
mod infrastructure;
mod setup;
mod teardown;

pub use cluster::{
    DeleteClusterRecord, SaveInfrastructure, SaveInfrastructureInput, SaveNodePools,
    SaveNodePoolsInput, SetClusterStatus, SetClusterStatusInput,
};
pub use infrastructure::{
    CreateInfrastructure, CreateNodePool, DeleteInfrastructure, DeleteNodePool,
    DeleteNodePoolInput, NodePoolInput, UpdateNodePool,
};
pub use setup::{
    DeployAutoscaler, DownloadKubeconfig, LabelNodes, ReconcileNodePoolLabels,
    ReconcileNodePoolLabelsInput, RunPostHook, RunPostHookInput, SetupPrivileges,
};
pub use teardown::{
    DeleteDnsRecords, DeleteDnsRecordsInput, DeleteKubernetesResources, DeleteUnusedSecrets,
};

use std::sync::Arc;

use crate::controller::context::Context;

/// Every activity, built from one context
#[derive(Clone)]
pub struct Activities {
    pub set_status: Arc<SetClusterStatus>,
    pub save_infrastructure: Arc<SaveInfrastructure>,
    pub save_node_pools: Arc<SaveNodePools>,
    pub delete_record: Arc<DeleteClusterRecord>,
    pub create_infrastructure: Arc<CreateInfrastructure>,
    pub delete_infrastructure: Arc<DeleteInfrastructure>,
    pub create_node_pool: Arc<CreateNodePool>,
    pub update_node_pool: Arc<UpdateNodePool>,
    pub delete_node_pool: Arc<DeleteNodePool>,
    pub download_kubeconfig: Arc<DownloadKubeconfig>,
    pub setup_privileges: Arc<SetupPrivileges>,
    pub label_nodes: Arc<LabelNodes>,
    pub reconcile_labels: Arc<ReconcileNodePoolLabels>,
    pub run_posthook: Arc<RunPostHook>,
    pub deploy_autoscaler: Arc<DeployAutoscaler>,
    pub delete_kubernetes_resources: Arc<DeleteKubernetesResources>,
    pub delete_dns_records: Arc<DeleteDnsRecords>,
    pub delete_unused_secrets: Arc<DeleteUnusedSecrets>,
}

impl Activities {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self {
            set_status: Arc::new(SetClusterStatus::new(ctx.clone())),
            save_infrastructure: Arc::new(SaveInfrastructure::new(ctx.clone())),
            save_node_pools: Arc::new(SaveNodePools::new(ctx.clone())),
            delete_record: Arc::new(DeleteClusterRecord::new(ctx.clone())),
            create_infrastructure: Arc::new(CreateInfrastructure::new(ctx.clone())),
            delete_infrastructure: Arc::new(DeleteInfrastructure::new(ctx.clone())),
            create_node_pool: Arc::new(CreateNodePool::new(ctx.clone())),
            update_node_pool: Arc::new(UpdateNodePool::new(ctx.clone())),
            delete_node_pool: Arc::new(DeleteNodePool::new(ctx.clone())),
            download_kubeconfig: Arc::new(DownloadKubeconfig::new(ctx.clone())),
            setup_privileges: Arc::new(SetupPrivileges::new(ctx.clone())),
            label_nodes: Arc::new(LabelNodes::new(ctx.clone())),
            reconcile_labels: Arc::new(ReconcileNodePoolLabels::new(ctx.clone())),
            run_posthook: Arc::new(RunPostHook::new(ctx.clone())),
            deploy_autoscaler: Arc::new(DeployAutoscaler::new(ctx.clone())),
            delete_kubernetes_resources: Arc::new(DeleteKubernetesResources::new(ctx.clone())),
            delete_dns_records: Arc::new(DeleteDnsRecords::new(ctx.clone())),
            delete_unused_secrets: Arc::new(DeleteUnusedSecrets::new(ctx)),
        }
    }
}

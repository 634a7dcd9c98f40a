//! Shared context for workflows, activities and the manager.
//!
//! Built once at startup from explicit dependencies and passed around as
//! `Arc<Context>`.

use std::sync::Arc;

use crate::cluster::{ClusterFactory, CommonCluster};
use crate::config::Config;
use crate::controller::error::Result;
use crate::controller::events::ClusterEvents;
use crate::health::HealthState;
use crate::model::{ClusterId, Distribution, OrganizationId};
use crate::ports::{
    DeploymentManager, DnsManager, ErrorHandler, InfrastructureProvisioner, KubernetesOps,
    LabelSource, LogErrorHandler, NoExternalLabels, ProvisionerRegistry,
};
use crate::posthook::PostHookRegistry;
use crate::secret::SecretStore;
use crate::store::ClusterRepository;

/// Dependencies of the lifecycle engine
#[derive(Clone)]
pub struct Context {
    pub config: Arc<Config>,
    pub repository: Arc<dyn ClusterRepository>,
    pub secrets: Arc<dyn SecretStore>,
    pub provisioners: Arc<ProvisionerRegistry>,
    pub deployments: Arc<dyn DeploymentManager>,
    pub kubernetes: Arc<dyn KubernetesOps>,
    pub label_source: Arc<dyn LabelSource>,
    pub dns: Arc<dyn DnsManager>,
    pub hooks: Arc<PostHookRegistry>,
    pub events: ClusterEvents,
    pub error_handler: Arc<dyn ErrorHandler>,
    /// Optional health state for metrics
    pub health_state: Option<Arc<HealthState>>,
}

impl Context {
    /// Create a context with the default label source, hooks and error handler
    pub fn new(
        config: Config,
        repository: Arc<dyn ClusterRepository>,
        secrets: Arc<dyn SecretStore>,
        provisioners: ProvisionerRegistry,
        deployments: Arc<dyn DeploymentManager>,
        kubernetes: Arc<dyn KubernetesOps>,
        dns: Arc<dyn DnsManager>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            repository,
            secrets,
            provisioners: Arc::new(provisioners),
            deployments,
            kubernetes,
            label_source: Arc::new(NoExternalLabels),
            dns,
            hooks: Arc::new(PostHookRegistry::with_builtin_hooks()),
            events: ClusterEvents::new(),
            error_handler: Arc::new(LogErrorHandler),
            health_state: None,
        }
    }

    pub fn with_label_source(mut self, source: Arc<dyn LabelSource>) -> Self {
        self.label_source = source;
        self
    }

    pub fn with_hooks(mut self, hooks: PostHookRegistry) -> Self {
        self.hooks = Arc::new(hooks);
        self
    }

    pub fn with_error_handler(mut self, handler: Arc<dyn ErrorHandler>) -> Self {
        self.error_handler = handler;
        self
    }

    pub fn with_health_state(mut self, state: Arc<HealthState>) -> Self {
        self.health_state = Some(state);
        self
    }

    pub fn cluster_factory(&self) -> ClusterFactory {
        ClusterFactory::new(
            self.repository.clone(),
            self.secrets.clone(),
            self.health_state.clone(),
        )
    }

    pub async fn load_cluster(&self, cluster_id: ClusterId) -> Result<Box<dyn CommonCluster>> {
        self.cluster_factory().load(cluster_id).await
    }

    pub async fn load_cluster_in(
        &self,
        organization_id: OrganizationId,
        cluster_id: ClusterId,
    ) -> Result<Box<dyn CommonCluster>> {
        self.cluster_factory()
            .load_in(organization_id, cluster_id)
            .await
    }

    pub fn provisioner(
        &self,
        distribution: Distribution,
    ) -> Result<Arc<dyn InfrastructureProvisioner>> {
        self.provisioners.get(distribution)
    }
}

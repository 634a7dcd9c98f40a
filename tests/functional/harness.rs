//! Recording fakes for the outbound ports and a harness wiring them into a
//! real `ClusterManager` backed by the in-memory stores.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use jiff::Timestamp;
use tokio::sync::broadcast;

use cluster_lifecycle::cluster::Identity;
use cluster_lifecycle::config::{Config, TtlConfig, WorkflowConfig};
use cluster_lifecycle::controller::events::ClusterEvent;
use cluster_lifecycle::manager::CreationContext;
use cluster_lifecycle::model::{
    BackendSpec, Cloud, Cluster, ClusterId, ClusterStatus, Distribution, EksSpec,
    InfrastructureState, NodePool, OrganizationId, SecretType,
};
use cluster_lifecycle::ports::{
    ClusterRef, DeploymentInfo, DeploymentManager, DeploymentSpec, DnsManager,
    InfrastructureProvisioner, KubernetesOps, ProvisionerRegistry, RoleSubject,
};
use cluster_lifecycle::secret::{InMemorySecretStore, SecretItem, StoreSecretValidator};
use cluster_lifecycle::store::{ClusterRepository, InMemoryClusterStore};
use cluster_lifecycle::workflow::RetryPolicy;
use cluster_lifecycle::{ClusterManager, Context, Error, Result, cluster_manager};

pub const ORG: OrganizationId = 42;
pub const USER: u64 = 7;
pub const AWS_SECRET: &str = "aws-credentials";
pub const AZURE_SECRET: &str = "azure-credentials";

static TRACING: Once = Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Ordered record of every outbound call, shared by all fakes
#[derive(Default)]
pub struct CallLog {
    calls: Mutex<Vec<String>>,
    failures: Mutex<BTreeSet<String>>,
}

impl CallLog {
    fn record(&self, call: String) -> Result<()> {
        self.calls.lock().unwrap().push(call.clone());
        if self.failures.lock().unwrap().contains(&call) {
            return Err(Error::internal(format!("injected failure in {call}")));
        }
        Ok(())
    }

    /// Make every later call with this exact name fail
    pub fn fail(&self, call: &str) {
        self.failures.lock().unwrap().insert(call.to_string());
    }

    pub fn recover(&self, call: &str) {
        self.failures.lock().unwrap().remove(call);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn contains(&self, call: &str) -> bool {
        self.calls.lock().unwrap().iter().any(|c| c == call)
    }

    /// Index of the first call with this name
    pub fn position(&self, call: &str) -> Option<usize> {
        self.calls.lock().unwrap().iter().position(|c| c == call)
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

pub struct FakeProvisioner {
    log: Arc<CallLog>,
}

#[async_trait]
impl InfrastructureProvisioner for FakeProvisioner {
    async fn create_infrastructure(&self, cluster: &Cluster) -> Result<InfrastructureState> {
        self.log.record("provisioner.create_infrastructure".into())?;
        Ok(InfrastructureState {
            provider_id: Some(format!("eks-{}", cluster.name)),
            api_endpoint: Some(format!("https://{}.eks.example.com", cluster.name)),
            ..Default::default()
        })
    }

    async fn create_node_pool(&self, _cluster: &Cluster, pool: &NodePool) -> Result<()> {
        self.log
            .record(format!("provisioner.create_node_pool:{}", pool.name))
    }

    async fn update_node_pool(&self, _cluster: &Cluster, pool: &NodePool) -> Result<()> {
        self.log
            .record(format!("provisioner.update_node_pool:{}", pool.name))
    }

    async fn delete_node_pool(&self, _cluster: &Cluster, pool_name: &str) -> Result<()> {
        self.log
            .record(format!("provisioner.delete_node_pool:{pool_name}"))
    }

    async fn delete_infrastructure(&self, _cluster: &Cluster) -> Result<()> {
        self.log.record("provisioner.delete_infrastructure".into())
    }

    async fn fetch_kubeconfig(&self, _cluster: &Cluster) -> Result<Vec<u8>> {
        self.log.record("provisioner.fetch_kubeconfig".into())?;
        Ok(b"apiVersion: v1\nkind: Config\n".to_vec())
    }
}

pub struct FakeDeployments {
    log: Arc<CallLog>,
}

#[async_trait]
impl DeploymentManager for FakeDeployments {
    async fn apply_deployment(&self, spec: &DeploymentSpec) -> Result<()> {
        self.log
            .record(format!("deployments.apply:{}", spec.release_name))
    }

    async fn apply_deployment_reuse_values(&self, spec: &DeploymentSpec) -> Result<()> {
        self.log
            .record(format!("deployments.upgrade:{}", spec.release_name))
    }

    async fn install_deployment(&self, spec: &DeploymentSpec) -> Result<()> {
        self.log
            .record(format!("deployments.install:{}", spec.release_name))
    }

    async fn delete_deployment(
        &self,
        _cluster_id: ClusterId,
        release_name: &str,
        _namespace: &str,
    ) -> Result<()> {
        self.log.record(format!("deployments.delete:{release_name}"))
    }

    async fn get_deployment(
        &self,
        _cluster_id: ClusterId,
        _release_name: &str,
        _namespace: &str,
    ) -> Result<Option<DeploymentInfo>> {
        Ok(None)
    }
}

pub struct FakeKubernetes {
    log: Arc<CallLog>,
    /// Last label set synced per pool
    pub synced_labels: Mutex<BTreeMap<String, BTreeMap<String, String>>>,
}

#[async_trait]
impl KubernetesOps for FakeKubernetes {
    async fn ensure_namespace(
        &self,
        _cluster: &ClusterRef,
        namespace: &str,
        _labels: &BTreeMap<String, String>,
    ) -> Result<()> {
        self.log.record(format!("kubernetes.ensure_namespace:{namespace}"))
    }

    async fn label_namespaces(
        &self,
        _cluster: &ClusterRef,
        _namespaces: &[String],
        _labels: &BTreeMap<String, String>,
    ) -> Result<()> {
        self.log.record("kubernetes.label_namespaces".into())
    }

    async fn ensure_cluster_admin_binding(
        &self,
        _cluster: &ClusterRef,
        subject: &RoleSubject,
    ) -> Result<()> {
        self.log
            .record(format!("kubernetes.admin_binding:{}", subject.name))
    }

    async fn label_nodes(
        &self,
        _cluster: &ClusterRef,
        _node_names: &[String],
        _labels: &BTreeMap<String, String>,
    ) -> Result<()> {
        self.log.record("kubernetes.label_nodes".into())
    }

    async fn sync_node_pool_labels(
        &self,
        _cluster: &ClusterRef,
        _namespace: &str,
        labels: &BTreeMap<String, BTreeMap<String, String>>,
    ) -> Result<()> {
        self.log.record("kubernetes.sync_node_pool_labels".into())?;
        self.synced_labels
            .lock()
            .unwrap()
            .extend(labels.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    async fn delete_user_resources(&self, _cluster: &ClusterRef) -> Result<()> {
        self.log.record("kubernetes.delete_user_resources".into())
    }
}

pub struct FakeDns {
    log: Arc<CallLog>,
}

#[async_trait]
impl DnsManager for FakeDns {
    async fn delete_records(&self, _organization_id: OrganizationId, cluster_uid: &str) -> Result<()> {
        self.log.record(format!("dns.delete_records:{cluster_uid}"))
    }
}

/// Engine wired to fakes, with fast retries and TTL rechecks
pub struct Harness {
    pub ctx: Arc<Context>,
    pub manager: Arc<ClusterManager>,
    pub store: Arc<InMemoryClusterStore>,
    pub secrets: Arc<InMemorySecretStore>,
    pub kubernetes: Arc<FakeKubernetes>,
    pub log: Arc<CallLog>,
}

impl Harness {
    pub async fn new() -> Self {
        init_tracing();

        let log = Arc::new(CallLog::default());
        let store = Arc::new(InMemoryClusterStore::new());
        let secrets = Arc::new(InMemorySecretStore::new());
        secrets
            .put(ORG, secret(AWS_SECRET, SecretType::Amazon))
            .await;
        secrets
            .put(ORG, secret(AZURE_SECRET, SecretType::Azure))
            .await;

        let kubernetes = Arc::new(FakeKubernetes {
            log: log.clone(),
            synced_labels: Mutex::new(BTreeMap::new()),
        });
        let config = Config {
            workflow: WorkflowConfig {
                activity_retry: RetryPolicy::no_retry(),
                ..Default::default()
            },
            ttl: TtlConfig {
                recheck_interval: Duration::from_millis(50),
                ..Default::default()
            },
            ..Default::default()
        };
        let ctx = Arc::new(Context::new(
            config,
            store.clone(),
            secrets.clone(),
            ProvisionerRegistry::new()
                .register(Distribution::Eks, Arc::new(FakeProvisioner { log: log.clone() })),
            Arc::new(FakeDeployments { log: log.clone() }),
            kubernetes.clone(),
            Arc::new(FakeDns { log: log.clone() }),
        ));
        let manager = cluster_manager(
            ctx.clone(),
            Arc::new(StoreSecretValidator::new(secrets.clone())),
        );

        Self {
            ctx,
            manager,
            store,
            secrets,
            kubernetes,
            log,
        }
    }

    pub fn events(&self) -> broadcast::Receiver<ClusterEvent> {
        self.ctx.events.subscribe()
    }

    /// Create a cluster from `request` and wait until it runs
    pub async fn create_running(&self, request: CreationContext) -> ClusterId {
        let cluster = self
            .manager
            .create_cluster(request, self.manager.standard_creator())
            .await
            .unwrap();
        let id = cluster.id();
        self.wait_for_status(id, ClusterStatus::Running).await;
        id
    }

    /// Store a record directly, bypassing creation
    pub async fn insert(&self, name: &str, status: ClusterStatus) -> Cluster {
        self.store.insert(record(name, status)).await.unwrap()
    }

    pub async fn get(&self, id: ClusterId) -> Result<Cluster> {
        self.store.get(id).await
    }

    /// Poll until the cluster reaches `status`
    pub async fn wait_for_status(&self, id: ClusterId, status: ClusterStatus) -> Cluster {
        let mut last = None;
        for _ in 0..500 {
            match self.store.get(id).await {
                Ok(cluster) if cluster.status == status => return cluster,
                Ok(cluster) => last = Some((cluster.status, cluster.status_message)),
                Err(e) => panic!("cluster {id} disappeared while waiting for {status}: {e}"),
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("cluster {id} never reached {status}, last seen {last:?}");
    }

    /// Poll until the cluster record is gone
    pub async fn wait_for_removal(&self, id: ClusterId) {
        for _ in 0..500 {
            if self.store.get(id).await.is_err() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("cluster {id} was never removed");
    }
}

/// Wait for the next event matching `wanted`
pub async fn next_event(
    events: &mut broadcast::Receiver<ClusterEvent>,
    wanted: ClusterEvent,
) -> ClusterEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.unwrap();
            if event == wanted {
                return event;
            }
        }
    })
    .await
    .expect("event not published in time")
}

fn secret(id: &str, secret_type: SecretType) -> SecretItem {
    SecretItem {
        id: id.to_string(),
        name: id.to_string(),
        secret_type,
        values: BTreeMap::from([("token".to_string(), "redacted".to_string())]),
        tags: Vec::new(),
    }
}

pub fn eks_backend() -> BackendSpec {
    BackendSpec::Eks(EksSpec {
        kubernetes_version: "1.30".to_string(),
        ..Default::default()
    })
}

/// EKS creation request with a single worker pool
pub fn creation_request(name: &str) -> CreationContext {
    CreationContext {
        organization_id: ORG,
        user_id: USER,
        name: name.to_string(),
        cloud: Cloud::Amazon,
        location: "eu-west-1".to_string(),
        secret_ids: vec![AWS_SECRET.to_string()],
        backend: eks_backend(),
        node_pools: vec![NodePool::new("default", "m5.large", 2)],
        scale_options: None,
        rbac_enabled: true,
        ttl_minutes: 0,
        post_hooks: BTreeMap::new(),
    }
}

/// Unsaved EKS record in the given status
pub fn record(name: &str, status: ClusterStatus) -> Cluster {
    Cluster {
        id: 0,
        uid: String::new(),
        organization_id: ORG,
        name: name.to_string(),
        cloud: Cloud::Amazon,
        distribution: Distribution::Eks,
        location: "eu-west-1".to_string(),
        status,
        status_message: String::new(),
        secret_id: AWS_SECRET.to_string(),
        ssh_secret_id: None,
        config_secret_id: None,
        rbac_enabled: true,
        scale_options: None,
        ttl_minutes: 0,
        started_at: None,
        created_at: Timestamp::now(),
        created_by: USER,
        node_pools: vec![NodePool::new("default", "m5.large", 2)],
        backend: eks_backend(),
        infrastructure: InfrastructureState::default(),
    }
}

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::backend::{BackendSpec, InfrastructureState};
use super::node_pool::NodePool;

/// Numeric identifier assigned by the repository on first persistence
pub type ClusterId = u64;
/// Owning organization
pub type OrganizationId = u64;
/// User that issued a request
pub type UserId = u64;

/// Cloud provider hosting the cluster
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cloud {
    Amazon,
    Azure,
    Google,
    Oracle,
}

impl Cloud {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cloud::Amazon => "amazon",
            Cloud::Azure => "azure",
            Cloud::Google => "google",
            Cloud::Oracle => "oracle",
        }
    }
}

impl fmt::Display for Cloud {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Cloud {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "amazon" => Ok(Cloud::Amazon),
            "azure" => Ok(Cloud::Azure),
            "google" => Ok(Cloud::Google),
            "oracle" => Ok(Cloud::Oracle),
            other => Err(format!("unknown cloud {other:?}")),
        }
    }
}

/// Kubernetes distribution, which selects the backend implementation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Distribution {
    Eks,
    Aks,
    Gke,
    Oke,
    SelfHosted,
}

impl Distribution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Distribution::Eks => "eks",
            Distribution::Aks => "aks",
            Distribution::Gke => "gke",
            Distribution::Oke => "oke",
            Distribution::SelfHosted => "self-hosted",
        }
    }

    /// Cloud a managed distribution is bound to. Self-hosted runs anywhere.
    pub fn managed_cloud(&self) -> Option<Cloud> {
        match self {
            Distribution::Eks => Some(Cloud::Amazon),
            Distribution::Aks => Some(Cloud::Azure),
            Distribution::Gke => Some(Cloud::Google),
            Distribution::Oke => Some(Cloud::Oracle),
            Distribution::SelfHosted => None,
        }
    }

    /// Whether the distribution can run on the given cloud
    pub fn supports(&self, cloud: Cloud) -> bool {
        self.managed_cloud().is_none_or(|c| c == cloud)
    }
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Distribution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "eks" => Ok(Distribution::Eks),
            "aks" => Ok(Distribution::Aks),
            "gke" => Ok(Distribution::Gke),
            "oke" => Ok(Distribution::Oke),
            "self-hosted" | "selfhosted" => Ok(Distribution::SelfHosted),
            other => Err(format!("unknown distribution {other:?}")),
        }
    }
}

/// Lifecycle status of a cluster
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClusterStatus {
    Creating,
    Running,
    Updating,
    Deleting,
    Warning,
    Error,
}

impl ClusterStatus {
    pub const ALL: [ClusterStatus; 6] = [
        ClusterStatus::Creating,
        ClusterStatus::Running,
        ClusterStatus::Updating,
        ClusterStatus::Deleting,
        ClusterStatus::Warning,
        ClusterStatus::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterStatus::Creating => "CREATING",
            ClusterStatus::Running => "RUNNING",
            ClusterStatus::Updating => "UPDATING",
            ClusterStatus::Deleting => "DELETING",
            ClusterStatus::Warning => "WARNING",
            ClusterStatus::Error => "ERROR",
        }
    }

    /// Running or Warning: the cluster is usable and accepts updates
    pub fn is_stable(&self) -> bool {
        matches!(self, ClusterStatus::Running | ClusterStatus::Warning)
    }

    /// A long running operation owns the cluster
    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            ClusterStatus::Creating | ClusterStatus::Updating | ClusterStatus::Deleting
        )
    }
}

impl fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClusterStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ClusterStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown cluster status {s:?}"))
    }
}

/// Kind of credential stored in the secret store
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecretType {
    Amazon,
    Azure,
    Google,
    Oracle,
    Ssh,
    Kubernetes,
}

impl SecretType {
    /// Credential type accepted for a cloud
    pub fn for_cloud(cloud: Cloud) -> Self {
        match cloud {
            Cloud::Amazon => SecretType::Amazon,
            Cloud::Azure => SecretType::Azure,
            Cloud::Google => SecretType::Google,
            Cloud::Oracle => SecretType::Oracle,
        }
    }
}

impl fmt::Display for SecretType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SecretType::Amazon => "amazon",
            SecretType::Azure => "azure",
            SecretType::Google => "google",
            SecretType::Oracle => "oracle",
            SecretType::Ssh => "ssh",
            SecretType::Kubernetes => "kubernetes",
        };
        f.write_str(s)
    }
}

/// Cluster-wide autoscaling preferences
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScaleOptions {
    pub enabled: bool,
    pub desired_cpu: f64,
    pub desired_mem: f64,
    pub desired_gpu: u32,
    pub on_demand_pct: u32,
    #[serde(default)]
    pub excludes: Vec<String>,
    pub keep_desired_capacity: bool,
}

/// Persisted cluster record
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    /// Zero until the record is first inserted
    pub id: ClusterId,
    pub uid: String,
    pub organization_id: OrganizationId,
    pub name: String,
    pub cloud: Cloud,
    pub distribution: Distribution,
    pub location: String,
    pub status: ClusterStatus,
    pub status_message: String,
    pub secret_id: String,
    pub ssh_secret_id: Option<String>,
    pub config_secret_id: Option<String>,
    pub rbac_enabled: bool,
    pub scale_options: Option<ScaleOptions>,
    /// Minutes after start before automatic deletion. Zero disables.
    pub ttl_minutes: u32,
    pub started_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub created_by: UserId,
    pub node_pools: Vec<NodePool>,
    pub backend: BackendSpec,
    #[serde(default)]
    pub infrastructure: InfrastructureState,
}

impl Cluster {
    pub fn node_pool(&self, name: &str) -> Option<&NodePool> {
        self.node_pools.iter().find(|pool| pool.name == name)
    }

    /// Read-only status projection
    pub fn status_view(&self) -> ClusterStatusView {
        ClusterStatusView {
            status: self.status,
            status_message: self.status_message.clone(),
            name: self.name.clone(),
            location: self.location.clone(),
            cloud: self.cloud,
            distribution: self.distribution,
            resource_id: self.id,
            node_pools: self
                .node_pools
                .iter()
                .map(|pool| (pool.name.clone(), NodePoolStatusView::from(pool)))
                .collect(),
            created_at: self.created_at,
            started_at: self.started_at,
        }
    }
}

/// Per-pool entry of a status view
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePoolStatusView {
    pub autoscaling: bool,
    pub count: u32,
    pub min_count: u32,
    pub max_count: u32,
    pub instance_type: String,
    pub spot_price: Option<f64>,
    pub preemptible: bool,
    pub labels: BTreeMap<String, String>,
}

impl From<&NodePool> for NodePoolStatusView {
    fn from(pool: &NodePool) -> Self {
        Self {
            autoscaling: pool.autoscaling,
            count: pool.count,
            min_count: pool.min_count,
            max_count: pool.max_count,
            instance_type: pool.instance_type.clone(),
            spot_price: pool.spot_price,
            preemptible: pool.preemptible,
            labels: pool.labels.clone(),
        }
    }
}

/// Status summary returned to API callers
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatusView {
    pub status: ClusterStatus,
    pub status_message: String,
    pub name: String,
    pub location: String,
    pub cloud: Cloud,
    pub distribution: Distribution,
    pub resource_id: ClusterId,
    pub node_pools: BTreeMap<String, NodePoolStatusView>,
    pub created_at: Timestamp,
    pub started_at: Option<Timestamp>,
}

/// Audit record written before every status change
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusHistoryEntry {
    pub cluster_id: ClusterId,
    pub cluster_name: String,
    /// None for the entry written when the record is first inserted
    pub from_status: Option<ClusterStatus>,
    pub from_status_message: String,
    pub to_status: ClusterStatus,
    pub to_status_message: String,
    pub created_at: Timestamp,
}

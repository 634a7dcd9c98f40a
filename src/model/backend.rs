use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::cluster::Distribution;

/// Subnet placement for EKS clusters
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subnet {
    /// Existing subnet to reuse
    pub id: Option<String>,
    /// CIDR for a subnet to create
    pub cidr: Option<String>,
    pub availability_zone: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EksSpec {
    pub kubernetes_version: String,
    pub vpc_id: Option<String>,
    pub vpc_cidr: Option<String>,
    #[serde(default)]
    pub subnets: Vec<Subnet>,
    /// IAM identity granted cluster-admin after creation
    pub admin_identity: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AksSpec {
    pub kubernetes_version: String,
    pub resource_group: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GkeSpec {
    pub kubernetes_version: String,
    pub project_id: String,
    pub network: Option<String>,
    pub subnetwork: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OkeSpec {
    pub kubernetes_version: String,
    pub compartment_id: String,
    pub vcn_id: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelfHostedSpec {
    pub kubernetes_version: String,
    pub network_cidr: String,
    pub service_cidr: String,
    pub pod_cidr: String,
}

/// Backend-specific configuration, tagged by distribution
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "distribution", rename_all = "kebab-case")]
pub enum BackendSpec {
    Eks(EksSpec),
    Aks(AksSpec),
    Gke(GkeSpec),
    Oke(OkeSpec),
    SelfHosted(SelfHostedSpec),
}

impl BackendSpec {
    pub fn distribution(&self) -> Distribution {
        match self {
            BackendSpec::Eks(_) => Distribution::Eks,
            BackendSpec::Aks(_) => Distribution::Aks,
            BackendSpec::Gke(_) => Distribution::Gke,
            BackendSpec::Oke(_) => Distribution::Oke,
            BackendSpec::SelfHosted(_) => Distribution::SelfHosted,
        }
    }

    pub fn kubernetes_version(&self) -> &str {
        match self {
            BackendSpec::Eks(s) => &s.kubernetes_version,
            BackendSpec::Aks(s) => &s.kubernetes_version,
            BackendSpec::Gke(s) => &s.kubernetes_version,
            BackendSpec::Oke(s) => &s.kubernetes_version,
            BackendSpec::SelfHosted(s) => &s.kubernetes_version,
        }
    }
}

/// Outputs of infrastructure provisioning, persisted on the cluster record
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfrastructureState {
    /// Provider-side identifier of the control plane
    pub provider_id: Option<String>,
    pub network_id: Option<String>,
    #[serde(default)]
    pub subnet_ids: Vec<String>,
    pub api_endpoint: Option<String>,
    /// Base64 encoded cluster CA bundle
    pub certificate_authority: Option<String>,
    /// Node names per pool, reported by backends that label nodes out of band
    #[serde(default)]
    pub node_names: BTreeMap<String, Vec<String>>,
    /// Remaining provider outputs
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
}

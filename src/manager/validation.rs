//! Request validation shared by the creators and updaters.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use ipnet::Ipv4Net;
use regex::Regex;

use crate::controller::error::{Error, Result};
use crate::model::{BackendSpec, Cloud, EksSpec, NodePool, SelfHostedSpec};

/// Longest accepted cluster name
pub const MAX_CLUSTER_NAME_LENGTH: usize = 40;

#[allow(clippy::expect_used)]
static DNS_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("valid regex"));

#[allow(clippy::expect_used)]
static RESOURCE_GROUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-\w._()]{1,90}$").expect("valid regex"));

fn invalid(message: impl Into<String>) -> Error {
    Error::InvalidRequest(message.into())
}

/// Cluster names are DNS-1123 labels of at most 40 characters
pub fn validate_cluster_name(name: &str) -> Result<()> {
    if name.len() > MAX_CLUSTER_NAME_LENGTH {
        return Err(invalid(format!(
            "cluster name {name:?} is longer than {MAX_CLUSTER_NAME_LENGTH} characters"
        )));
    }
    if !DNS_LABEL.is_match(name) {
        return Err(invalid(format!(
            "cluster name {name:?} must consist of lower case alphanumeric characters or '-', \
             and must start and end with an alphanumeric character"
        )));
    }
    Ok(())
}

pub fn validate_node_pool(pool: &NodePool) -> Result<()> {
    if !DNS_LABEL.is_match(&pool.name) {
        return Err(invalid(format!("invalid node pool name {:?}", pool.name)));
    }
    if pool.instance_type.trim().is_empty() {
        return Err(invalid(format!(
            "node pool {} has no instance type",
            pool.name
        )));
    }
    if pool.autoscaling {
        if pool.max_count == 0 || pool.min_count > pool.max_count {
            return Err(invalid(format!(
                "node pool {}: min count {} must not exceed max count {}",
                pool.name, pool.min_count, pool.max_count
            )));
        }
        if pool.count < pool.min_count || pool.count > pool.max_count {
            return Err(invalid(format!(
                "node pool {}: count {} must be between {} and {}",
                pool.name, pool.count, pool.min_count, pool.max_count
            )));
        }
    }
    if pool.spot_price.is_some_and(|price| price < 0.0) {
        return Err(invalid(format!(
            "node pool {} has a negative spot price",
            pool.name
        )));
    }
    Ok(())
}

/// Validate every pool and reject duplicate names
pub fn validate_node_pools(pools: &[NodePool]) -> Result<()> {
    if pools.is_empty() {
        return Err(invalid("at least one node pool is required"));
    }
    let mut seen = BTreeSet::new();
    for pool in pools {
        validate_node_pool(pool)?;
        if !seen.insert(pool.name.as_str()) {
            return Err(invalid(format!("duplicate node pool name {}", pool.name)));
        }
    }
    Ok(())
}

/// Parse an IPv4 network in CIDR notation
pub fn parse_cidr(value: &str) -> Result<Ipv4Net> {
    value
        .parse::<Ipv4Net>()
        .map_err(|e| invalid(format!("{value:?} is not a valid IPv4 CIDR: {e}")))
}

/// Whether two networks share any address
pub fn overlaps(a: &Ipv4Net, b: &Ipv4Net) -> bool {
    a.contains(&b.network()) || b.contains(&a.network())
}

fn validate_eks(spec: &EksSpec) -> Result<()> {
    let vpc = spec.vpc_cidr.as_deref().map(parse_cidr).transpose()?;

    let mut subnet_cidrs: Vec<Ipv4Net> = Vec::new();
    for subnet in &spec.subnets {
        match (&subnet.id, &subnet.cidr) {
            (None, None) => return Err(invalid("subnet needs either an id or a CIDR")),
            (Some(_), Some(_)) => {
                return Err(invalid("subnet can not have both an id and a CIDR"));
            }
            (Some(_), None) if spec.vpc_id.is_none() => {
                return Err(invalid("existing subnets can only be used with an existing VPC"));
            }
            (_, Some(cidr)) => {
                let cidr = parse_cidr(cidr)?;
                if let Some(vpc) = &vpc {
                    if !vpc.contains(&cidr) {
                        return Err(invalid(format!(
                            "subnet {cidr} is outside of the VPC network {vpc}"
                        )));
                    }
                }
                if subnet_cidrs.iter().any(|other| overlaps(other, &cidr)) {
                    return Err(invalid("subnet CIDRs overlap"));
                }
                subnet_cidrs.push(cidr);
            }
            _ => {}
        }
    }
    Ok(())
}

fn validate_self_hosted(spec: &SelfHostedSpec, pools: &[NodePool]) -> Result<()> {
    let network = parse_cidr(&spec.network_cidr)?;
    let service = parse_cidr(&spec.service_cidr)?;
    let pod = parse_cidr(&spec.pod_cidr)?;
    if overlaps(&service, &pod) {
        return Err(invalid("service and pod networks overlap"));
    }
    if overlaps(&network, &service) || overlaps(&network, &pod) {
        return Err(invalid("node network overlaps the service or pod network"));
    }
    if !pools.iter().any(NodePool::is_master) {
        return Err(invalid("a self-hosted cluster needs a master node pool"));
    }
    Ok(())
}

/// Backend-specific checks for a creation request
pub fn validate_backend(backend: &BackendSpec, cloud: Cloud, pools: &[NodePool]) -> Result<()> {
    let distribution = backend.distribution();
    if !distribution.supports(cloud) {
        return Err(invalid(format!(
            "distribution {distribution} does not run on {cloud}"
        )));
    }
    if backend.kubernetes_version().trim().is_empty() {
        return Err(invalid("kubernetes version is required"));
    }

    match backend {
        BackendSpec::Eks(spec) => validate_eks(spec),
        BackendSpec::Aks(spec) => {
            if !RESOURCE_GROUP.is_match(&spec.resource_group) || spec.resource_group.ends_with('.')
            {
                return Err(invalid(format!(
                    "invalid resource group name {:?}",
                    spec.resource_group
                )));
            }
            Ok(())
        }
        BackendSpec::Gke(spec) if spec.project_id.trim().is_empty() => {
            Err(invalid("GKE clusters need a project id"))
        }
        BackendSpec::Oke(spec) if spec.compartment_id.trim().is_empty() => {
            Err(invalid("OKE clusters need a compartment id"))
        }
        BackendSpec::SelfHosted(spec) => validate_self_hosted(spec, pools),
        BackendSpec::Gke(_) | BackendSpec::Oke(_) => Ok(()),
    }
}

//! Desired node pool labels.
//!
//! Every pool gets a reserved name label and a pricing label, plus labels
//! from the injected [`LabelSource`] and the user's own labels. User labels
//! inside a reserved domain are dropped so they cannot shadow the labels the
//! engine owns.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::controller::error::Result;
use crate::model::{Cloud, Distribution, NodePool};
use crate::ports::LabelSource;

/// Domain owned by the lifecycle engine
pub const RESERVED_DOMAIN: &str = "nodepool.lifecycle.io";
/// Node pool a node belongs to
pub const NODE_POOL_NAME_LABEL: &str = "nodepool.lifecycle.io/name";
/// "true" for on-demand capacity, "false" for spot or preemptible
pub const ON_DEMAND_LABEL: &str = "nodepool.lifecycle.io/ondemand";

const RESERVED_DOMAINS: [&str; 3] = [RESERVED_DOMAIN, "kubernetes.io", "k8s.io"];

/// Labels per pool name
pub type PoolLabels = BTreeMap<String, BTreeMap<String, String>>;

/// Whether a label key lives in a domain users may not write to
pub fn is_reserved(key: &str) -> bool {
    let Some((prefix, _)) = key.split_once('/') else {
        return false;
    };
    RESERVED_DOMAINS
        .iter()
        .any(|domain| prefix == *domain || prefix.ends_with(&format!(".{domain}")))
}

/// Pool attributes that drive label computation. Recomputed on every pass.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePoolLabelDescriptor {
    pub name: String,
    /// Pool already exists on the cluster
    pub existing: bool,
    pub instance_type: String,
    pub spot_price: Option<f64>,
    pub preemptible: bool,
    pub custom_labels: BTreeMap<String, String>,
}

impl NodePoolLabelDescriptor {
    /// Descriptor for a pool being created
    pub fn new_pool(pool: &NodePool) -> Self {
        Self {
            name: pool.name.clone(),
            existing: false,
            instance_type: pool.instance_type.clone(),
            spot_price: pool.spot_price,
            preemptible: pool.preemptible,
            custom_labels: pool.labels.clone(),
        }
    }

    /// Descriptor for a pool that is already running
    pub fn existing_pool(pool: &NodePool) -> Self {
        Self {
            existing: true,
            ..Self::new_pool(pool)
        }
    }

    pub fn is_on_demand(&self) -> bool {
        !self.preemptible && self.spot_price.is_none_or(|price| price <= 0.0)
    }
}

/// Labels for one pool.
///
/// Existing pools without requested labels yield an empty map so labels
/// applied earlier are left alone.
pub async fn pool_labels(
    source: &dyn LabelSource,
    cloud: Cloud,
    distribution: Distribution,
    region: &str,
    pool: &NodePoolLabelDescriptor,
) -> Result<BTreeMap<String, String>> {
    if pool.existing && pool.custom_labels.is_empty() {
        return Ok(BTreeMap::new());
    }

    let mut labels = BTreeMap::new();
    labels.insert(NODE_POOL_NAME_LABEL.to_string(), pool.name.clone());
    labels.insert(ON_DEMAND_LABEL.to_string(), pool.is_on_demand().to_string());

    let external = source
        .get_labels(cloud, distribution, region, &pool.instance_type)
        .await?;
    for (key, value) in external {
        labels.entry(key).or_insert(value);
    }

    for (key, value) in &pool.custom_labels {
        if is_reserved(key) {
            debug!(pool = %pool.name, label = %key, "Dropping label in reserved domain");
            continue;
        }
        labels.insert(key.clone(), value.clone());
    }
    Ok(labels)
}

/// Desired labels for every pool with a non-empty delta
pub async fn desired_labels(
    source: &dyn LabelSource,
    cloud: Cloud,
    distribution: Distribution,
    region: &str,
    pools: &[NodePoolLabelDescriptor],
) -> Result<PoolLabels> {
    let mut desired = PoolLabels::new();
    for pool in pools {
        let labels = pool_labels(source, cloud, distribution, region, pool).await?;
        if !labels.is_empty() {
            desired.insert(pool.name.clone(), labels);
        }
    }
    Ok(desired)
}

/// Merge a delta into the labels currently applied. Applying the same delta
/// again leaves the result unchanged.
pub fn merge_labels(current: &PoolLabels, delta: &PoolLabels) -> PoolLabels {
    let mut merged = current.clone();
    for (pool, labels) in delta {
        merged
            .entry(pool.clone())
            .or_default()
            .extend(labels.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    merged
}

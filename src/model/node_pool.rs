use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Role of the nodes in a pool
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Master,
    Worker,
    System,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeRole::Master => write!(f, "master"),
            NodeRole::Worker => write!(f, "worker"),
            NodeRole::System => write!(f, "system"),
        }
    }
}

/// Named group of identically configured worker machines
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePool {
    pub name: String,
    #[serde(default)]
    pub roles: BTreeSet<NodeRole>,
    pub instance_type: String,
    pub count: u32,
    #[serde(default)]
    pub min_count: u32,
    #[serde(default)]
    pub max_count: u32,
    #[serde(default)]
    pub autoscaling: bool,
    /// Maximum bid for spot capacity. None or zero means on-demand.
    #[serde(default)]
    pub spot_price: Option<f64>,
    #[serde(default)]
    pub preemptible: bool,
    /// User supplied node labels
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Backend specific pool settings passed through to the provisioner
    #[serde(default)]
    pub provider_config: serde_json::Value,
}

impl NodePool {
    pub fn new(name: impl Into<String>, instance_type: impl Into<String>, count: u32) -> Self {
        Self {
            name: name.into(),
            roles: BTreeSet::from([NodeRole::Worker]),
            instance_type: instance_type.into(),
            count,
            min_count: count,
            max_count: count,
            autoscaling: false,
            spot_price: None,
            preemptible: false,
            labels: BTreeMap::new(),
            provider_config: serde_json::Value::Null,
        }
    }

    pub fn with_autoscaling(mut self, min_count: u32, max_count: u32) -> Self {
        self.autoscaling = true;
        self.min_count = min_count;
        self.max_count = max_count;
        self
    }

    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn with_spot_price(mut self, price: f64) -> Self {
        self.spot_price = Some(price);
        self
    }

    pub fn is_master(&self) -> bool {
        self.roles.contains(&NodeRole::Master)
    }

    /// Spot and preemptible pools are not on-demand
    pub fn is_on_demand(&self) -> bool {
        !self.preemptible && self.spot_price.is_none_or(|price| price <= 0.0)
    }
}

/// Node pool changes needed to reach a requested set of pools
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePoolDiff {
    pub to_delete: Vec<String>,
    pub to_create: Vec<NodePool>,
    pub to_update: Vec<NodePool>,
}

impl NodePoolDiff {
    /// Compare current pools with the requested set.
    ///
    /// Pools present in both but unchanged are left out of the diff.
    pub fn compute(current: &[NodePool], requested: &[NodePool]) -> Self {
        let mut diff = NodePoolDiff::default();

        for pool in current {
            if !requested.iter().any(|r| r.name == pool.name) {
                diff.to_delete.push(pool.name.clone());
            }
        }

        for pool in requested {
            match current.iter().find(|c| c.name == pool.name) {
                None => diff.to_create.push(pool.clone()),
                Some(existing) if existing != pool => diff.to_update.push(pool.clone()),
                Some(_) => {}
            }
        }

        diff
    }

    pub fn is_empty(&self) -> bool {
        self.to_delete.is_empty() && self.to_create.is_empty() && self.to_update.is_empty()
    }
}

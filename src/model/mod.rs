//! Domain model for managed clusters.
//!
//! Contains the persisted cluster record, node pools, backend-specific
//! configuration, and the status history entries written on every
//! status change.

mod backend;
mod cluster;
mod node_pool;

pub use backend::{
    AksSpec, BackendSpec, EksSpec, GkeSpec, InfrastructureState, OkeSpec, SelfHostedSpec, Subnet,
};
pub use cluster::{
    Cloud, Cluster, ClusterId, ClusterStatus, ClusterStatusView, Distribution, NodePoolStatusView,
    OrganizationId, ScaleOptions, SecretType, StatusHistoryEntry, UserId,
};
pub use node_pool::{NodePool, NodePoolDiff, NodeRole};

// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Property-based tests for cluster-lifecycle.
//!
//! Uses proptest to generate random inputs and verify invariants.

use std::collections::BTreeMap;

use jiff::{SignedDuration, Timestamp};
use proptest::prelude::*;

use cluster_lifecycle::controller::state_machine::{
    ClusterStateMachine, StatusEvent, TransitionResult,
};
use cluster_lifecycle::controller::ttl::{TtlDecision, evaluate};
use cluster_lifecycle::labels::{PoolLabels, is_reserved, merge_labels};
use cluster_lifecycle::manager::validation::{overlaps, parse_cidr, validate_cluster_name};
use cluster_lifecycle::model::{
    BackendSpec, Cloud, Cluster, ClusterStatus, Distribution, EksSpec, InfrastructureState,
    NodePool, NodePoolDiff,
};

/// Strategy for generating random statuses.
fn any_status() -> impl Strategy<Value = ClusterStatus> {
    prop::sample::select(ClusterStatus::ALL.to_vec())
}

/// Strategy for generating random events.
fn any_event() -> impl Strategy<Value = StatusEvent> {
    prop_oneof![
        Just(StatusEvent::Completed),
        Just(StatusEvent::PartiallyCompleted),
        Just(StatusEvent::Failed),
        Just(StatusEvent::UpdateRequested),
        Just(StatusEvent::DeletionRequested),
        Just(StatusEvent::ForcedDeletion),
    ]
}

fn label_map() -> impl Strategy<Value = BTreeMap<String, String>> {
    prop::collection::btree_map("[a-z]{1,8}", "[a-z0-9]{0,8}", 0..5)
}

fn pool_labels() -> impl Strategy<Value = PoolLabels> {
    prop::collection::btree_map("pool[0-9]", label_map(), 0..4)
}

fn node_pools() -> impl Strategy<Value = Vec<NodePool>> {
    prop::collection::btree_map("pool[0-9]", (1u32..10, "m5\\.(large|xlarge)"), 0..6).prop_map(
        |pools| {
            pools
                .into_iter()
                .map(|(name, (count, instance))| NodePool::new(name, instance, count))
                .collect()
        },
    )
}

fn cluster(status: ClusterStatus, ttl_minutes: u32, started_at: Option<Timestamp>) -> Cluster {
    Cluster {
        id: 1,
        uid: "uid-1".to_string(),
        organization_id: 1,
        name: "prop".to_string(),
        cloud: Cloud::Amazon,
        distribution: Distribution::Eks,
        location: "us-east-1".to_string(),
        status,
        status_message: String::new(),
        secret_id: "aws".to_string(),
        ssh_secret_id: None,
        config_secret_id: None,
        rbac_enabled: true,
        scale_options: None,
        ttl_minutes,
        started_at,
        created_at: Timestamp::UNIX_EPOCH,
        created_by: 1,
        node_pools: Vec::new(),
        backend: BackendSpec::Eks(EksSpec::default()),
        infrastructure: InfrastructureState::default(),
    }
}

proptest! {
    /// Transitions never leave the set of statuses and never return to Creating.
    #[test]
    fn transitions_never_reenter_creating(status in any_status(), event in any_event()) {
        let sm = ClusterStateMachine::shared();
        match sm.transition(status, event) {
            TransitionResult::Success { from, to, .. } => {
                prop_assert_eq!(from, status);
                prop_assert_ne!(to, ClusterStatus::Creating);
                prop_assert!(sm.allows(from, to));
            }
            TransitionResult::InvalidTransition { current, .. } => {
                prop_assert_eq!(current, status);
                prop_assert!(!sm.can_transition(status, event));
            }
        }
    }

    /// Forced deletion is always possible, except from Deleting itself.
    #[test]
    fn forced_deletion_always_allowed(status in any_status()) {
        let sm = ClusterStateMachine::shared();
        prop_assert_eq!(
            sm.can_transition(status, StatusEvent::ForcedDeletion),
            status != ClusterStatus::Deleting
        );
    }

    /// Regular deletion is refused while an operation is in progress.
    #[test]
    fn regular_deletion_requires_settled_status(status in any_status()) {
        let sm = ClusterStateMachine::shared();
        prop_assert_eq!(
            sm.can_transition(status, StatusEvent::DeletionRequested),
            !status.is_in_progress()
        );
    }

    /// Zero TTL and unstable statuses are never eligible for expiry.
    #[test]
    fn ttl_only_applies_to_stable_clusters(
        status in any_status(),
        ttl in 0u32..10_000,
        age_minutes in 0i64..100_000,
    ) {
        let now = Timestamp::UNIX_EPOCH + SignedDuration::from_hours(24 * 365 * 30);
        let started = now - SignedDuration::from_mins(age_minutes);
        let decision = evaluate(&cluster(status, ttl, Some(started)), now);

        if ttl == 0 || !status.is_stable() {
            prop_assert_eq!(decision, TtlDecision::Skip);
        } else if age_minutes > i64::from(ttl) {
            prop_assert_eq!(decision, TtlDecision::Expired);
        } else {
            prop_assert_eq!(decision, TtlDecision::NotYetExpired);
        }
    }

    /// Applying the same label delta twice is the same as applying it once.
    #[test]
    fn label_merge_is_idempotent(current in pool_labels(), delta in pool_labels()) {
        let once = merge_labels(&current, &delta);
        let twice = merge_labels(&once, &delta);
        prop_assert_eq!(&once, &twice);

        for (pool, labels) in &delta {
            for (key, value) in labels {
                prop_assert_eq!(&once[pool][key], value);
            }
        }
    }

    /// Keys in the engine's domains are always reserved.
    #[test]
    fn reserved_domains_are_detected(name in "[a-z]{1,10}", sub in "[a-z]{1,6}") {
        let owned = format!("nodepool.lifecycle.io/{name}");
        let kubernetes = format!("{sub}.kubernetes.io/{name}");
        let user = format!("{sub}.example.com/{name}");
        prop_assert!(is_reserved(&owned));
        prop_assert!(is_reserved(&kubernetes));
        prop_assert!(!is_reserved(&user));
        prop_assert!(!is_reserved(&name));
    }

    /// Applying a diff to the current pools yields the requested set.
    #[test]
    fn diff_reaches_requested_pools(current in node_pools(), requested in node_pools()) {
        let diff = NodePoolDiff::compute(&current, &requested);

        let mut result: Vec<NodePool> = current
            .iter()
            .filter(|p| !diff.to_delete.contains(&p.name))
            .cloned()
            .collect();
        for pool in diff.to_update.iter().chain(&diff.to_create) {
            match result.iter_mut().find(|p| p.name == pool.name) {
                Some(existing) => *existing = pool.clone(),
                None => result.push(pool.clone()),
            }
        }
        result.sort_by(|a, b| a.name.cmp(&b.name));
        let mut expected = requested.clone();
        expected.sort_by(|a, b| a.name.cmp(&b.name));
        prop_assert_eq!(result, expected);

        prop_assert_eq!(diff.is_empty(), current == requested);
    }

    /// Valid DNS labels up to the length limit are accepted.
    #[test]
    fn dns_label_names_are_valid(name in "[a-z][a-z0-9-]{0,38}[a-z0-9]") {
        prop_assert!(validate_cluster_name(&name).is_ok());
    }

    /// Upper case is never accepted in cluster names.
    #[test]
    fn upper_case_names_are_rejected(name in "[a-z]{0,5}[A-Z][a-z]{0,5}") {
        prop_assert!(validate_cluster_name(&name).is_err());
    }

    /// Every dotted quad with a prefix parses, and contains itself.
    #[test]
    fn cidrs_parse_and_contain_themselves(
        octets in prop::array::uniform4(0u8..=255),
        prefix in 0u8..=32,
    ) {
        let text = format!("{}.{}.{}.{}/{prefix}", octets[0], octets[1], octets[2], octets[3]);
        let cidr = parse_cidr(&text).unwrap();
        prop_assert_eq!(cidr.prefix_len(), prefix);
        prop_assert!(overlaps(&cidr, &cidr));
        prop_assert!(cidr.contains(&cidr));
        prop_assert!(cidr.contains(&cidr.network()));
    }
}

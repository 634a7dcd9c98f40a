// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Unit tests for cluster-lifecycle.
//!
//! These tests exercise the public types in isolation, without running
//! workflows.

mod model_tests {
    use std::collections::BTreeMap;

    use jiff::Timestamp;

    use cluster_lifecycle::model::{
        BackendSpec, Cloud, Cluster, ClusterStatus, Distribution, EksSpec, GkeSpec,
        InfrastructureState, NodePool, NodePoolDiff, NodeRole, SelfHostedSpec,
    };

    #[test]
    fn test_status_groups() {
        let stable: Vec<_> = ClusterStatus::ALL
            .iter()
            .filter(|s| s.is_stable())
            .collect();
        assert_eq!(stable, vec![&ClusterStatus::Running, &ClusterStatus::Warning]);

        let busy: Vec<_> = ClusterStatus::ALL
            .iter()
            .filter(|s| s.is_in_progress())
            .collect();
        assert_eq!(
            busy,
            vec![
                &ClusterStatus::Creating,
                &ClusterStatus::Updating,
                &ClusterStatus::Deleting
            ]
        );
        assert!(!ClusterStatus::Error.is_stable());
        assert!(!ClusterStatus::Error.is_in_progress());
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&ClusterStatus::Running).unwrap(),
            "\"RUNNING\""
        );
        assert_eq!(ClusterStatus::Deleting.to_string(), "DELETING");
    }

    #[test]
    fn test_distribution_cloud_binding() {
        assert!(Distribution::Eks.supports(Cloud::Amazon));
        assert!(!Distribution::Eks.supports(Cloud::Google));
        assert!(Distribution::Aks.supports(Cloud::Azure));
        for cloud in [Cloud::Amazon, Cloud::Azure, Cloud::Google, Cloud::Oracle] {
            assert!(Distribution::SelfHosted.supports(cloud));
        }
        assert_eq!("self-hosted".parse::<Distribution>(), Ok(Distribution::SelfHosted));
        assert_eq!("GKE".parse::<Distribution>(), Ok(Distribution::Gke));
        assert!("openshift".parse::<Distribution>().is_err());
    }

    #[test]
    fn test_backend_spec_is_tagged_by_distribution() {
        let spec = BackendSpec::Gke(GkeSpec {
            kubernetes_version: "1.29".into(),
            project_id: "demo-project".into(),
            ..Default::default()
        });
        let value = serde_json::to_value(&spec).unwrap();
        assert_eq!(value["distribution"], "gke");
        assert_eq!(spec.distribution(), Distribution::Gke);
        assert_eq!(spec.kubernetes_version(), "1.29");

        let parsed: BackendSpec = serde_json::from_value(serde_json::json!({
            "distribution": "self-hosted",
            "kubernetesVersion": "1.30",
            "networkCidr": "10.0.0.0/16",
            "serviceCidr": "10.96.0.0/12",
            "podCidr": "10.244.0.0/16",
        }))
        .unwrap();
        assert!(matches!(parsed, BackendSpec::SelfHosted(SelfHostedSpec { .. })));
    }

    #[test]
    fn test_pool_pricing() {
        assert!(NodePool::new("a", "m5.large", 1).is_on_demand());
        assert!(NodePool::new("a", "m5.large", 1).with_spot_price(0.0).is_on_demand());
        assert!(!NodePool::new("a", "m5.large", 1).with_spot_price(0.2).is_on_demand());

        let mut preemptible = NodePool::new("a", "n1-standard-2", 1);
        preemptible.preemptible = true;
        assert!(!preemptible.is_on_demand());
    }

    #[test]
    fn test_pool_defaults_from_json() {
        let pool: NodePool = serde_json::from_value(serde_json::json!({
            "name": "default",
            "instanceType": "m5.large",
            "count": 3,
        }))
        .unwrap();
        assert!(pool.roles.is_empty());
        assert!(!pool.autoscaling);
        assert!(pool.labels.is_empty());
        assert!(!pool.is_master());
    }

    #[test]
    fn test_status_view_indexes_pools_by_name() {
        let cluster = Cluster {
            id: 12,
            uid: "uid-12".into(),
            organization_id: 1,
            name: "demo".into(),
            cloud: Cloud::Amazon,
            distribution: Distribution::Eks,
            location: "eu-west-1".into(),
            status: ClusterStatus::Warning,
            status_message: "update finished with failures".into(),
            secret_id: "aws".into(),
            ssh_secret_id: None,
            config_secret_id: None,
            rbac_enabled: true,
            scale_options: None,
            ttl_minutes: 0,
            started_at: None,
            created_at: Timestamp::UNIX_EPOCH,
            created_by: 1,
            node_pools: vec![
                NodePool::new("default", "m5.large", 2),
                NodePool::new("spot", "m5.large", 1)
                    .with_spot_price(0.1)
                    .with_autoscaling(1, 4),
            ],
            backend: BackendSpec::Eks(EksSpec::default()),
            infrastructure: InfrastructureState::default(),
        };

        let view = cluster.status_view();
        assert_eq!(view.resource_id, 12);
        assert_eq!(view.status, ClusterStatus::Warning);
        assert_eq!(view.status_message, "update finished with failures");
        assert_eq!(view.node_pools.len(), 2);
        let spot = &view.node_pools["spot"];
        assert!(spot.autoscaling);
        assert_eq!((spot.min_count, spot.max_count), (1, 4));
        assert_eq!(spot.spot_price, Some(0.1));
        assert_eq!(view.node_pools["default"].count, 2);
    }

    #[test]
    fn test_diff_classifies_pools() {
        let mut master = NodePool::new("master", "m5.large", 1);
        master.roles = [NodeRole::Master].into();
        let current = vec![
            master.clone(),
            NodePool::new("old", "m5.large", 1),
            NodePool::new("web", "m5.large", 2),
        ];
        let requested = vec![
            master,
            NodePool::new("web", "m5.large", 4),
            NodePool::new("gpu", "p3.2xlarge", 1)
                .with_labels(BTreeMap::from([("gpu".to_string(), "true".to_string())])),
        ];

        let diff = NodePoolDiff::compute(&current, &requested);
        assert_eq!(diff.to_delete, vec!["old".to_string()]);
        assert_eq!(diff.to_create.len(), 1);
        assert_eq!(diff.to_create[0].name, "gpu");
        assert_eq!(diff.to_update.len(), 1);
        assert_eq!(diff.to_update[0].count, 4);
        assert!(!diff.is_empty());
    }
}

mod error_tests {
    use cluster_lifecycle::Error;
    use cluster_lifecycle::controller::error::{CLIENT_ERROR_REASON, PANIC_REASON};

    #[test]
    fn test_classification_survives_cluster_tagging() {
        let err = Error::NotFound("node pool gpu".into()).with_cluster(3, 42);
        assert!(err.is_not_found());
        assert!(err.is_client_error());
        assert!(!err.is_retryable());
        assert_eq!(err.reason(), CLIENT_ERROR_REASON);
        assert!(err.to_string().starts_with("cluster 3 (organization 42)"));

        // tagging twice keeps the first cluster
        let again = err.with_cluster(4, 42);
        assert!(matches!(again, Error::Cluster { cluster_id: 3, .. }));
    }

    #[test]
    fn test_system_errors_are_retried() {
        assert!(Error::internal("boom").is_retryable());
        assert!(Error::Timeout("activity".into()).is_retryable());
        assert!(!Error::InvalidRequest("bad".into()).is_retryable());
        assert!(!Error::Config("bad".into()).is_retryable());
    }

    #[test]
    fn test_panic_payloads() {
        let err = Error::from_panic(Box::new("exploded"));
        assert!(matches!(&err, Error::Panic(msg) if msg == "exploded"));
        assert_eq!(err.reason(), PANIC_REASON);
        assert!(!err.is_retryable());

        let err = Error::from_panic(Box::new(String::from("owned")));
        assert!(matches!(&err, Error::Panic(msg) if msg == "owned"));
    }
}

mod config_tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use cluster_lifecycle::Error;
    use cluster_lifecycle::config::Config;

    fn load(vars: &[(&str, &str)]) -> Result<Config, Error> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.workflow.task_queue, "cluster-lifecycle");
        assert_eq!(config.kubernetes.system_namespace, "lifecycle-system");
        assert_eq!(config.proxy.entry_ttl, Duration::from_secs(30 * 60));
        assert_eq!(config.health_port, 8080);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("LIFECYCLE_TASK_QUEUE", "clusters"),
            ("LIFECYCLE_ACTIVITY_SLOTS", "4"),
            ("LIFECYCLE_TTL_RECHECK_SECS", "15"),
            ("LIFECYCLE_SYSTEM_NAMESPACE", "platform"),
            ("LIFECYCLE_HEALTH_PORT", "9090"),
        ])
        .unwrap();
        assert_eq!(config.workflow.task_queue, "clusters");
        assert_eq!(config.workflow.activity_slots, 4);
        assert_eq!(config.ttl.recheck_interval, Duration::from_secs(15));
        assert_eq!(config.kubernetes.system_namespace, "platform");
        assert_eq!(config.health_port, 9090);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            load(&[("LIFECYCLE_ACTIVITY_SLOTS", "many")]),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            load(&[("LIFECYCLE_ACTIVITY_SLOTS", "0")]),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            load(&[("LIFECYCLE_PROXY_GC_INTERVAL_SECS", "0")]),
            Err(Error::Config(_))
        ));
    }
}

mod posthook_tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use cluster_lifecycle::posthook::PostHookRegistry;

    #[test]
    fn test_base_hooks_run_first_with_parameters() {
        let registry = PostHookRegistry::with_builtin_hooks();
        let requested = BTreeMap::from([
            ("InstallDashboard".to_string(), json!({})),
            ("LabelNamespaces".to_string(), json!(["monitoring"])),
        ]);

        let plan = registry.plan(&requested).unwrap();
        let names: Vec<_> = plan.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "CreateSystemNamespace",
                "LabelNamespaces",
                "InstallClusterAutoscaler",
                "InstallDashboard"
            ]
        );
        assert_eq!(plan[1].param, json!(["monitoring"]));
        assert!(plan[0].param.is_null());
    }

    #[test]
    fn test_unknown_hook_is_rejected() {
        let registry = PostHookRegistry::with_builtin_hooks();
        let requested = BTreeMap::from([("InstallMainframe".to_string(), json!(null))]);
        assert!(registry.plan(&requested).unwrap_err().is_client_error());
    }
}

mod secret_tests {
    use std::collections::BTreeMap;

    use cluster_lifecycle::Error;
    use cluster_lifecycle::model::{Cloud, SecretType};
    use cluster_lifecycle::secret::{
        InMemorySecretStore, SecretItem, SecretStore, StoreSecretValidator, validate_secrets,
    };

    fn item(id: &str, secret_type: SecretType) -> SecretItem {
        SecretItem {
            id: id.into(),
            name: id.into(),
            secret_type,
            values: BTreeMap::new(),
            tags: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_candidates_are_tried_in_order() {
        let store = std::sync::Arc::new(InMemorySecretStore::new());
        store.put(1, item("gcp", SecretType::Google)).await;
        store.put(1, item("aws-a", SecretType::Amazon)).await;
        store.put(1, item("aws-b", SecretType::Amazon)).await;
        let validator = StoreSecretValidator::new(store.clone());

        let candidates = vec!["missing".to_string(), "gcp".into(), "aws-b".into(), "aws-a".into()];
        let chosen = validate_secrets(&validator, 1, &candidates, Cloud::Amazon)
            .await
            .unwrap();
        assert_eq!(chosen, "aws-b");

        // secrets are scoped to their organization
        let err = validate_secrets(&validator, 2, &["aws-a".to_string()], Cloud::Amazon)
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let err = validate_secrets(&validator, 1, &[], Cloud::Amazon)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_generated_secrets_are_named_after_the_cluster() {
        let store = InMemorySecretStore::new();
        let kubeconfig = store
            .store_kubeconfig(1, "demo", b"apiVersion: v1")
            .await
            .unwrap();
        assert_eq!(kubeconfig, "demo-kubeconfig");
        let ssh = store.create_ssh_key(1, "demo", "uid-1").await.unwrap();
        assert_eq!(ssh, "demo-ssh");

        store.delete(1, &ssh).await.unwrap();
        assert!(!store.contains(1, &ssh).await);
        assert!(store.contains(1, &kubeconfig).await);
    }
}

//! Cluster creation from request to running cluster.

use cluster_lifecycle::Error;
use cluster_lifecycle::cluster::{Identity, StatusTracker};
use cluster_lifecycle::controller::events::ClusterEvent;
use cluster_lifecycle::labels::NODE_POOL_NAME_LABEL;
use cluster_lifecycle::model::{ClusterStatus, NodePool};
use cluster_lifecycle::store::ClusterRepository;

use crate::{AZURE_SECRET, AWS_SECRET, Harness, ORG, creation_request, next_event};

#[tokio::test]
async fn test_create_runs_to_running() {
    let h = Harness::new().await;
    let mut events = h.events();

    let cluster = h
        .manager
        .create_cluster(creation_request("demo"), h.manager.standard_creator())
        .await
        .unwrap();
    assert_ne!(cluster.id(), 0);
    assert!(!cluster.uid().is_empty());
    assert_eq!(cluster.status(), ClusterStatus::Creating);
    assert_eq!(cluster.status_message(), "Cluster creation started");

    let id = cluster.id();
    next_event(&mut events, ClusterEvent::Created(id)).await;

    let record = h.get(id).await.unwrap();
    assert_eq!(record.status, ClusterStatus::Running);
    assert_eq!(record.status_message, "Cluster created successfully");
    assert!(record.started_at.is_some());
    assert_eq!(record.secret_id, AWS_SECRET);
    assert_eq!(
        record.infrastructure.api_endpoint.as_deref(),
        Some("https://demo.eks.example.com")
    );
    assert_eq!(record.config_secret_id.as_deref(), Some("demo-kubeconfig"));
    assert!(h.secrets.contains(ORG, "demo-kubeconfig").await);

    let infra = h.log.position("provisioner.create_infrastructure").unwrap();
    let pool = h.log.position("provisioner.create_node_pool:default").unwrap();
    let namespace = h
        .log
        .position("kubernetes.ensure_namespace:lifecycle-system")
        .unwrap();
    assert!(infra < pool);
    assert!(pool < namespace);
    assert!(h.log.contains("kubernetes.admin_binding:lifecycle:cluster-admins"));
    assert!(h.log.contains("kubernetes.label_namespaces"));
    // no autoscaling pool, so the autoscaler release is removed
    assert!(h.log.contains("deployments.delete:cluster-autoscaler"));

    let synced = h.kubernetes.synced_labels.lock().unwrap().clone();
    assert_eq!(synced["default"][NODE_POOL_NAME_LABEL], "default");

    let history = h.store.status_history(id).await.unwrap();
    let transitions: Vec<_> = history.iter().map(|e| (e.from_status, e.to_status)).collect();
    assert_eq!(
        transitions,
        vec![
            (None, ClusterStatus::Creating),
            (Some(ClusterStatus::Creating), ClusterStatus::Running),
        ]
    );
}

#[tokio::test]
async fn test_duplicate_name_is_rejected_without_persisting() {
    let h = Harness::new().await;
    h.create_running(creation_request("demo")).await;
    h.log.clear();

    let err = h
        .manager
        .create_cluster(creation_request("demo"), h.manager.standard_creator())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, Error::AlreadyExists { organization_id: ORG, ref name } if name == "demo"));
    assert_eq!(h.store.len().await, 1);
    assert!(h.log.calls().is_empty());
}

#[tokio::test]
async fn test_invalid_request_is_not_persisted() {
    let h = Harness::new().await;

    let err = h
        .manager
        .create_cluster(creation_request("Not_A_Name"), h.manager.standard_creator())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, Error::InvalidRequest(_)));

    let mut request = creation_request("demo");
    request.node_pools.push(NodePool::new("default", "m5.xlarge", 1));
    let err = h
        .manager
        .create_cluster(request, h.manager.standard_creator())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, Error::InvalidRequest(_)));

    let mut request = creation_request("demo");
    request
        .post_hooks
        .insert("InstallMainframe".to_string(), serde_json::Value::Null);
    let err = h
        .manager
        .create_cluster(request, h.manager.standard_creator())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, Error::InvalidRequest(_)));

    assert!(h.store.is_empty().await);
    assert!(h.log.calls().is_empty());
}

#[tokio::test]
async fn test_first_matching_secret_is_used() {
    let h = Harness::new().await;

    let mut request = creation_request("demo");
    request.secret_ids = vec![AZURE_SECRET.to_string()];
    let err = h
        .manager
        .create_cluster(request, h.manager.standard_creator())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, Error::SecretTypeMismatch { .. }));
    assert!(h.store.is_empty().await);

    let mut request = creation_request("demo");
    request.secret_ids = vec![AZURE_SECRET.to_string(), AWS_SECRET.to_string()];
    let id = h.create_running(request).await;
    assert_eq!(h.get(id).await.unwrap().secret_id, AWS_SECRET);
}

#[tokio::test]
async fn test_infrastructure_failure_marks_error() {
    let h = Harness::new().await;
    h.log.fail("provisioner.create_infrastructure");

    let cluster = h
        .manager
        .create_cluster(creation_request("demo"), h.manager.standard_creator())
        .await
        .unwrap();

    let record = h.wait_for_status(cluster.id(), ClusterStatus::Error).await;
    assert!(
        record.status_message.starts_with("cluster creation failed"),
        "unexpected message {:?}",
        record.status_message
    );
    assert!(!h.log.contains("provisioner.create_node_pool:default"));
    assert!(record.started_at.is_none());
}

#[tokio::test]
async fn test_failing_posthook_stops_the_sequence() {
    let h = Harness::new().await;
    h.log.fail("kubernetes.ensure_namespace:lifecycle-system");

    let cluster = h
        .manager
        .create_cluster(creation_request("demo"), h.manager.standard_creator())
        .await
        .unwrap();

    let record = h.wait_for_status(cluster.id(), ClusterStatus::Error).await;
    assert!(
        record.status_message.starts_with("hook CreateSystemNamespace failed"),
        "unexpected message {:?}",
        record.status_message
    );
    // the hooks after the failed one never ran
    assert!(!h.log.contains("kubernetes.label_namespaces"));
}

#[tokio::test]
async fn test_kube_proxy_is_cached_until_deletion() {
    let h = Harness::new().await;
    let id = h.create_running(creation_request("demo")).await;
    let uid = h.get(id).await.unwrap().uid;

    let first = h.manager.get_kube_proxy(ORG, id).await.unwrap();
    let second = h.manager.get_kube_proxy(ORG, id).await.unwrap();
    assert_eq!(first.cluster_uid(), uid);
    assert!(std::sync::Arc::ptr_eq(&first, &second));
    assert_eq!(h.manager.proxies().len(), 1);

    let err = h.manager.get_kube_proxy(ORG + 1, id).await.err().unwrap();
    assert!(err.is_not_found());

    h.manager.delete_cluster(ORG, id, false).await.unwrap();
    assert!(h.manager.proxies().is_empty());
}

//! Regular and forced cluster deletion.

use cluster_lifecycle::Error;
use cluster_lifecycle::controller::events::ClusterEvent;
use cluster_lifecycle::model::ClusterStatus;

use crate::{AWS_SECRET, Harness, ORG, creation_request, next_event};

#[tokio::test]
async fn test_delete_removes_cluster_and_owned_secrets() {
    let h = Harness::new().await;
    let id = h.create_running(creation_request("demo")).await;
    let uid = h.get(id).await.unwrap().uid;
    h.log.clear();
    let mut events = h.events();

    h.manager.delete_cluster(ORG, id, false).await.unwrap();
    next_event(&mut events, ClusterEvent::Deleted(id)).await;

    assert!(h.get(id).await.unwrap_err().is_not_found());
    assert!(!h.secrets.contains(ORG, "demo-kubeconfig").await);
    assert!(h.secrets.contains(ORG, AWS_SECRET).await);

    let resources = h.log.position("kubernetes.delete_user_resources").unwrap();
    let dns = h.log.position(&format!("dns.delete_records:{uid}")).unwrap();
    let infra = h.log.position("provisioner.delete_infrastructure").unwrap();
    assert!(resources < dns);
    assert!(dns < infra);

    // the name is free again
    h.create_running(creation_request("demo")).await;
}

#[tokio::test]
async fn test_delete_of_busy_cluster_needs_force() {
    let h = Harness::new().await;
    let cluster = h.insert("busy", ClusterStatus::Updating).await;

    let err = h
        .manager
        .delete_cluster(ORG, cluster.id, false)
        .await
        .err()
        .unwrap();
    assert!(matches!(err, Error::PreconditionFailed(_)));
    assert_eq!(h.get(cluster.id).await.unwrap().status, ClusterStatus::Updating);

    h.manager.delete_cluster(ORG, cluster.id, true).await.unwrap();
    h.wait_for_removal(cluster.id).await;
    // never reachable, so nothing to clean up inside the cluster
    assert!(!h.log.contains("kubernetes.delete_user_resources"));
    assert!(h.log.contains("provisioner.delete_infrastructure"));
}

#[tokio::test]
async fn test_failed_step_marks_error_unless_forced() {
    let h = Harness::new().await;
    let id = h.create_running(creation_request("demo")).await;
    h.log.fail("provisioner.delete_infrastructure");

    h.manager.delete_cluster(ORG, id, false).await.unwrap();
    let record = h.wait_for_status(id, ClusterStatus::Error).await;
    assert!(
        record.status_message.starts_with("failed to delete infrastructure"),
        "unexpected message {:?}",
        record.status_message
    );
    // secrets are only removed after the infrastructure is gone
    assert!(h.secrets.contains(ORG, "demo-kubeconfig").await);

    h.manager.delete_cluster(ORG, id, true).await.unwrap();
    h.wait_for_removal(id).await;
    assert!(!h.secrets.contains(ORG, "demo-kubeconfig").await);
}

#[tokio::test]
async fn test_delete_of_unknown_cluster() {
    let h = Harness::new().await;
    let err = h.manager.delete_cluster(ORG, 999, false).await.err().unwrap();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_cluster_being_deleted_is_not_deleted_again() {
    let h = Harness::new().await;
    let cluster = h.insert("leaving", ClusterStatus::Deleting).await;

    for force in [false, true] {
        let err = h
            .manager
            .delete_cluster(ORG, cluster.id, force)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::PreconditionFailed(_)), "force={force}: {err}");
    }

    let record = h.get(cluster.id).await.unwrap();
    assert_eq!(record.status, ClusterStatus::Deleting);
    assert_eq!(record.status_message, cluster.status_message);
    assert!(!h.log.contains("provisioner.delete_infrastructure"));
}

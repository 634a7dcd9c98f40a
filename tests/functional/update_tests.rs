//! Node pool updates on running clusters.

use cluster_lifecycle::Error;
use cluster_lifecycle::controller::events::ClusterEvent;
use cluster_lifecycle::manager::UpdateContext;
use cluster_lifecycle::model::{ClusterId, ClusterStatus, NodePool};

use crate::{Harness, ORG, USER, creation_request, next_event};

fn update(cluster_id: ClusterId, node_pools: Vec<NodePool>) -> UpdateContext {
    UpdateContext {
        organization_id: ORG,
        cluster_id,
        user_id: USER,
        node_pools,
        scale_options: None,
    }
}

fn pool_names(pools: &[NodePool]) -> Vec<&str> {
    pools.iter().map(|p| p.name.as_str()).collect()
}

#[tokio::test]
async fn test_pools_are_deleted_before_new_ones_are_created() {
    let h = Harness::new().await;
    let id = h.create_running(creation_request("demo")).await;
    h.log.clear();
    let mut events = h.events();

    h.manager
        .update_cluster(
            update(id, vec![NodePool::new("gpu", "p3.2xlarge", 1)]),
            h.manager.standard_updater(),
        )
        .await
        .unwrap();
    assert_eq!(h.get(id).await.unwrap().status, ClusterStatus::Updating);

    next_event(&mut events, ClusterEvent::Updated(id)).await;
    let record = h.get(id).await.unwrap();
    assert_eq!(record.status, ClusterStatus::Running);
    assert_eq!(record.status_message, "Cluster updated successfully");
    assert_eq!(pool_names(&record.node_pools), vec!["gpu"]);

    let deleted = h.log.position("provisioner.delete_node_pool:default").unwrap();
    let created = h.log.position("provisioner.create_node_pool:gpu").unwrap();
    assert!(deleted < created);
}

#[tokio::test]
async fn test_unchanged_pools_are_left_alone() {
    let h = Harness::new().await;
    let mut request = creation_request("demo");
    request.node_pools.push(NodePool::new("batch", "c5.large", 1));
    let id = h.create_running(request).await;
    h.log.clear();

    let requested = vec![
        NodePool::new("default", "m5.large", 2),
        NodePool::new("batch", "c5.large", 4),
    ];
    h.manager
        .update_cluster(update(id, requested), h.manager.standard_updater())
        .await
        .unwrap();
    let record = h.wait_for_status(id, ClusterStatus::Running).await;

    assert!(h.log.contains("provisioner.update_node_pool:batch"));
    assert!(!h.log.contains("provisioner.update_node_pool:default"));
    let batch = record.node_pool("batch").unwrap();
    assert_eq!(batch.count, 4);
}

#[tokio::test]
async fn test_failed_pool_leaves_cluster_in_warning() {
    let h = Harness::new().await;
    let id = h.create_running(creation_request("demo")).await;
    h.log.fail("provisioner.create_node_pool:gpu");

    let requested = vec![
        NodePool::new("default", "m5.large", 2),
        NodePool::new("gpu", "p3.2xlarge", 1),
        NodePool::new("batch", "c5.large", 1),
    ];
    h.manager
        .update_cluster(update(id, requested), h.manager.standard_updater())
        .await
        .unwrap();

    let record = h.wait_for_status(id, ClusterStatus::Warning).await;
    assert!(
        record.status_message.starts_with("update finished with failures: gpu: "),
        "unexpected message {:?}",
        record.status_message
    );
    assert_eq!(pool_names(&record.node_pools), vec!["default", "batch"]);

    // a cluster in warning can still be updated
    h.log.recover("provisioner.create_node_pool:gpu");
    let requested = vec![
        NodePool::new("default", "m5.large", 2),
        NodePool::new("gpu", "p3.2xlarge", 1),
        NodePool::new("batch", "c5.large", 1),
    ];
    h.manager
        .update_cluster(update(id, requested), h.manager.standard_updater())
        .await
        .unwrap();
    let record = h.wait_for_status(id, ClusterStatus::Running).await;
    assert_eq!(record.node_pools.len(), 3);
}

#[tokio::test]
async fn test_update_requires_stable_cluster() {
    let h = Harness::new().await;
    let cluster = h.insert("busy", ClusterStatus::Creating).await;

    let err = h
        .manager
        .update_cluster(
            update(cluster.id, vec![NodePool::new("default", "m5.large", 3)]),
            h.manager.standard_updater(),
        )
        .await
        .err()
        .unwrap();
    assert!(matches!(err, Error::PreconditionFailed(_)));
    assert_eq!(h.get(cluster.id).await.unwrap().status, ClusterStatus::Creating);
}

#[tokio::test]
async fn test_update_is_scoped_to_organization() {
    let h = Harness::new().await;
    let id = h.create_running(creation_request("demo")).await;

    let mut request = update(id, vec![NodePool::new("default", "m5.large", 3)]);
    request.organization_id = ORG + 1;
    let err = h
        .manager
        .update_cluster(request, h.manager.standard_updater())
        .await
        .err()
        .unwrap();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_node_pool_update_changes_only_named_pools() {
    let h = Harness::new().await;
    let mut request = creation_request("demo");
    request.node_pools.push(NodePool::new("batch", "c5.large", 1));
    let id = h.create_running(request).await;
    h.log.clear();

    let err = h
        .manager
        .update_node_pool(update(id, vec![NodePool::new("missing", "m5.large", 1)]))
        .await
        .err()
        .unwrap();
    assert!(err.is_not_found());
    assert_eq!(h.get(id).await.unwrap().status, ClusterStatus::Running);

    h.manager
        .update_node_pool(update(id, vec![NodePool::new("default", "m5.large", 5)]))
        .await
        .unwrap();
    let record = h.wait_for_status(id, ClusterStatus::Running).await;

    assert_eq!(pool_names(&record.node_pools), vec!["default", "batch"]);
    assert_eq!(record.node_pool("default").unwrap().count, 5);
    assert!(h.log.contains("provisioner.update_node_pool:default"));
    assert!(!h.log.calls().iter().any(|c| c.contains("delete_node_pool")));
}

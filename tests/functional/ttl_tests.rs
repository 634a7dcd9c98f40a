//! TTL controller driving real deletions.

use std::time::Duration;

use jiff::{SignedDuration, Timestamp};
use tokio::sync::oneshot;

use cluster_lifecycle::controller::ttl::TtlController;
use cluster_lifecycle::model::{Cluster, ClusterStatus};
use cluster_lifecycle::store::ClusterRepository;

use crate::{Harness, record};

async fn insert_running(h: &Harness, name: &str, ttl_minutes: u32, age: SignedDuration) -> Cluster {
    let mut cluster = record(name, ClusterStatus::Running);
    cluster.ttl_minutes = ttl_minutes;
    cluster.started_at = Some(Timestamp::now() - age);
    h.store.insert(cluster).await.unwrap()
}

fn controller(h: &Harness) -> TtlController {
    TtlController::new(
        &h.ctx.config.ttl,
        h.ctx.repository.clone(),
        h.ctx.events.clone(),
        h.manager.clone(),
        None,
    )
}

#[tokio::test]
async fn test_expired_clusters_are_deleted() {
    let h = Harness::new().await;
    let expired = insert_running(&h, "expired", 60, SignedDuration::from_hours(2)).await;
    let fresh = insert_running(&h, "fresh", 60, SignedDuration::from_mins(5)).await;
    let forever = insert_running(&h, "forever", 0, SignedDuration::from_hours(48)).await;

    let ttl = controller(&h);
    let (stop, stopped) = oneshot::channel::<()>();
    let run = tokio::spawn(async move {
        ttl.run(async {
            let _ = stopped.await;
        })
        .await
    });

    h.wait_for_removal(expired.id).await;
    // give the worker a few recheck rounds
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.get(fresh.id).await.unwrap().status, ClusterStatus::Running);
    assert_eq!(h.get(forever.id).await.unwrap().status, ClusterStatus::Running);

    stop.send(()).unwrap();
    run.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_clusters_updated_later_are_picked_up() {
    let h = Harness::new().await;
    let ttl = controller(&h);
    let (stop, stopped) = oneshot::channel::<()>();
    let run = tokio::spawn(async move {
        ttl.run(async {
            let _ = stopped.await;
        })
        .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    let mut cluster = insert_running(&h, "late", 0, SignedDuration::from_hours(2)).await;
    cluster.ttl_minutes = 30;
    h.store.save(&cluster).await.unwrap();
    h.ctx
        .events
        .publish(cluster_lifecycle::controller::events::ClusterEvent::Updated(cluster.id));

    h.wait_for_removal(cluster.id).await;
    stop.send(()).unwrap();
    run.await.unwrap().unwrap();
}

//! Cluster autoscaler deployment, shared by creation and node pool updates.

use serde_json::{Map, Value, json};
use tracing::{debug, info};

use crate::cluster::{CommonCluster, Identity, NodePoolAware, Scalable};
use crate::controller::context::Context;
use crate::controller::error::Result;
use crate::model::Cloud;
use crate::ports::DeploymentSpec;

pub const AUTOSCALER_RELEASE: &str = "cluster-autoscaler";
pub const AUTOSCALER_CHART: &str = "autoscaler/cluster-autoscaler";

fn cloud_provider(cloud: Cloud) -> &'static str {
    match cloud {
        Cloud::Amazon => "aws",
        Cloud::Azure => "azure",
        Cloud::Google => "gce",
        Cloud::Oracle => "oci",
    }
}

/// Chart values for the cluster, or None when no pool autoscales
pub fn autoscaler_values(cluster: &dyn CommonCluster) -> Option<Value> {
    let groups: Vec<Value> = cluster
        .node_pools()
        .iter()
        .filter(|pool| pool.autoscaling)
        .map(|pool| {
            json!({
                "name": pool.name,
                "minSize": pool.min_count,
                "maxSize": pool.max_count,
            })
        })
        .collect();
    if groups.is_empty() {
        return None;
    }

    let mut extra_args = Map::new();
    extra_args.insert("balance-similar-node-groups".into(), json!(true));
    extra_args.insert("skip-nodes-with-local-storage".into(), json!(false));
    if let Some(options) = cluster.scale_options().filter(|o| o.enabled) {
        extra_args.insert("expander".into(), json!("least-waste"));
        if !options.excludes.is_empty() {
            extra_args.insert("ignore-daemonsets-utilization".into(), json!(true));
        }
    }

    let mut values = json!({
        "cloudProvider": cloud_provider(cluster.cloud()),
        "autoDiscovery": { "clusterName": cluster.name() },
        "autoscalingGroups": groups,
        "location": cluster.location(),
        "extraArgs": extra_args,
    });
    if let Some(group) = cluster.as_resource_group_aware() {
        values["azureResourceGroup"] = json!(group.resource_group_name());
    }
    Some(values)
}

/// Bring the autoscaler release in line with the cluster's pools
pub async fn deploy_cluster_autoscaler(ctx: &Context, cluster: &dyn CommonCluster) -> Result<()> {
    let namespace = &ctx.config.kubernetes.system_namespace;

    let Some(values) = autoscaler_values(cluster) else {
        debug!(cluster_id = cluster.id(), "No autoscaling node pools, removing autoscaler");
        return ctx
            .deployments
            .delete_deployment(cluster.id(), AUTOSCALER_RELEASE, namespace)
            .await;
    };

    ctx.deployments
        .apply_deployment(&DeploymentSpec {
            cluster_id: cluster.id(),
            organization_id: cluster.organization_id(),
            namespace: namespace.clone(),
            chart_name: AUTOSCALER_CHART.to_string(),
            chart_version: None,
            release_name: AUTOSCALER_RELEASE.to_string(),
            values,
        })
        .await?;
    info!(cluster_id = cluster.id(), "Cluster autoscaler deployed");
    Ok(())
}

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, info};

use super::{PostHook, deploy_cluster_autoscaler};
use crate::cluster::{CommonCluster, Identity, NodePoolAware};
use crate::controller::context::Context;
use crate::controller::error::{Error, Result};
use crate::ports::DeploymentSpec;

/// Label put on namespaces to tie them to the owning cluster
pub const CLUSTER_NAME_LABEL: &str = "lifecycle.io/cluster-name";
const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Deep merge `overrides` into `base`. Non-object overrides replace the base.
fn merge_values(base: &mut Value, overrides: &Value) {
    match (base, overrides) {
        (Value::Object(base), Value::Object(overrides)) => {
            for (key, value) in overrides {
                merge_values(base.entry(key.clone()).or_insert(Value::Null), value);
            }
        }
        (_, Value::Null) => {}
        (base, overrides) => *base = overrides.clone(),
    }
}

fn release(
    ctx: &Context,
    cluster: &dyn CommonCluster,
    chart: &str,
    release: &str,
    values: Value,
) -> DeploymentSpec {
    DeploymentSpec {
        cluster_id: cluster.id(),
        organization_id: cluster.organization_id(),
        namespace: ctx.config.kubernetes.system_namespace.clone(),
        chart_name: chart.to_string(),
        chart_version: None,
        release_name: release.to_string(),
        values,
    }
}

/// Namespace system components are installed into.
/// A string parameter overrides the configured name.
pub struct CreateSystemNamespace;

#[async_trait]
impl PostHook for CreateSystemNamespace {
    fn name(&self) -> &'static str {
        "CreateSystemNamespace"
    }

    async fn run(&self, ctx: &Context, cluster: &dyn CommonCluster, param: &Value) -> Result<()> {
        let namespace = param
            .as_str()
            .unwrap_or(&ctx.config.kubernetes.system_namespace);
        let labels = BTreeMap::from([(
            MANAGED_BY_LABEL.to_string(),
            ctx.config.kubernetes.field_manager.clone(),
        )]);
        ctx.kubernetes
            .ensure_namespace(&cluster.cluster_ref(), namespace, &labels)
            .await
    }
}

/// Tag the standard namespaces with the cluster name.
/// An array parameter adds namespaces to the set.
pub struct LabelNamespaces;

#[async_trait]
impl PostHook for LabelNamespaces {
    fn name(&self) -> &'static str {
        "LabelNamespaces"
    }

    async fn run(&self, ctx: &Context, cluster: &dyn CommonCluster, param: &Value) -> Result<()> {
        let mut namespaces = vec![
            "default".to_string(),
            "kube-system".to_string(),
            ctx.config.kubernetes.system_namespace.clone(),
        ];
        match param {
            Value::Null => {}
            Value::Array(extra) => {
                for namespace in extra {
                    let namespace = namespace.as_str().ok_or_else(|| {
                        Error::InvalidRequest("LabelNamespaces expects namespace names".into())
                    })?;
                    if !namespaces.iter().any(|n| n == namespace) {
                        namespaces.push(namespace.to_string());
                    }
                }
            }
            _ => {
                return Err(Error::InvalidRequest(
                    "LabelNamespaces expects a list of namespaces".into(),
                ));
            }
        }

        let labels = BTreeMap::from([(CLUSTER_NAME_LABEL.to_string(), cluster.name().to_string())]);
        ctx.kubernetes
            .label_namespaces(&cluster.cluster_ref(), &namespaces, &labels)
            .await
    }
}

pub struct InstallClusterAutoscaler;

#[async_trait]
impl PostHook for InstallClusterAutoscaler {
    fn name(&self) -> &'static str {
        "InstallClusterAutoscaler"
    }

    async fn run(&self, ctx: &Context, cluster: &dyn CommonCluster, _param: &Value) -> Result<()> {
        deploy_cluster_autoscaler(ctx, cluster).await
    }
}

/// Scheduler extension that prefers on-demand nodes for critical workloads.
/// Skipped when every pool is on-demand.
pub struct ConfigureSpotScheduling;

#[async_trait]
impl PostHook for ConfigureSpotScheduling {
    fn name(&self) -> &'static str {
        "ConfigureSpotScheduling"
    }

    fn priority(&self) -> i32 {
        10
    }

    async fn run(&self, ctx: &Context, cluster: &dyn CommonCluster, param: &Value) -> Result<()> {
        let spot_pools: Vec<&str> = cluster
            .node_pools()
            .iter()
            .filter(|pool| !pool.is_on_demand())
            .map(|pool| pool.name.as_str())
            .collect();
        if spot_pools.is_empty() {
            debug!(cluster_id = cluster.id(), "No spot pools, skipping spot scheduling");
            return Ok(());
        }

        let mut values = json!({ "spotPools": spot_pools });
        merge_values(&mut values, param);
        ctx.deployments
            .apply_deployment(&release(
                ctx,
                cluster,
                "lifecycle/spot-scheduler",
                "spot-scheduler",
                values,
            ))
            .await
    }
}

pub struct InstallDashboard;

#[async_trait]
impl PostHook for InstallDashboard {
    fn name(&self) -> &'static str {
        "InstallDashboard"
    }

    fn priority(&self) -> i32 {
        20
    }

    async fn run(&self, ctx: &Context, cluster: &dyn CommonCluster, param: &Value) -> Result<()> {
        let mut values = json!({ "metricsScraper": { "enabled": true } });
        merge_values(&mut values, param);
        ctx.deployments
            .apply_deployment(&release(
                ctx,
                cluster,
                "kubernetes-dashboard/kubernetes-dashboard",
                "dashboard",
                values,
            ))
            .await
    }
}

/// Installs the ingress controller on first run and afterwards upgrades it
/// keeping values set out of band.
pub struct InstallIngressController;

#[async_trait]
impl PostHook for InstallIngressController {
    fn name(&self) -> &'static str {
        "InstallIngressController"
    }

    fn priority(&self) -> i32 {
        30
    }

    async fn run(&self, ctx: &Context, cluster: &dyn CommonCluster, param: &Value) -> Result<()> {
        let mut values = json!({ "controller": { "ingressClassResource": { "default": true } } });
        merge_values(&mut values, param);
        let spec = release(ctx, cluster, "ingress-nginx/ingress-nginx", "ingress", values);

        let existing = ctx
            .deployments
            .get_deployment(spec.cluster_id, &spec.release_name, &spec.namespace)
            .await?;
        match existing {
            Some(info) => {
                info!(cluster_id = cluster.id(), version = %info.chart_version, "Upgrading ingress controller");
                ctx.deployments.apply_deployment_reuse_values(&spec).await
            }
            None => ctx.deployments.install_deployment(&spec).await,
        }
    }
}

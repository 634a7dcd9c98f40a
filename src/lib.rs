//! cluster-lifecycle library crate
//!
//! Orchestrates the lifecycle of Kubernetes clusters across managed cloud
//! offerings and self-hosted installations: creation, node pool updates,
//! deletion and TTL based expiry, with post-creation hooks run as workflows.

pub mod cluster;
pub mod config;
pub mod controller;
pub mod health;
pub mod kubernetes;
pub mod labels;
pub mod manager;
pub mod model;
pub mod ports;
pub mod posthook;
pub mod proxy;
pub mod secret;
pub mod store;
pub mod workflow;

#[cfg(test)]
mod test_support;

pub use controller::context::Context;
pub use controller::error::{Error, Result};
pub use health::HealthState;
pub use manager::ClusterManager;

use std::future::Future;
use std::sync::Arc;

use tracing::{error, info};

use controller::ttl::TtlController;
use secret::SecretValidator;
use workflow::activities::Activities;
use workflow::LocalWorkflowEngine;
use workflow::workflows::register_workflows;

/// Build a workflow engine with every lifecycle workflow registered
pub fn workflow_engine(ctx: Arc<Context>) -> Arc<LocalWorkflowEngine> {
    let mut engine = LocalWorkflowEngine::new(&ctx.config.workflow, ctx.health_state.clone());
    let activities = Activities::new(ctx);
    register_workflows(&mut engine, &activities);
    Arc::new(engine)
}

/// Build a cluster manager running its workflows on a local engine
pub fn cluster_manager(
    ctx: Arc<Context>,
    validator: Arc<dyn SecretValidator>,
) -> Arc<ClusterManager> {
    let engine = workflow_engine(ctx.clone());
    Arc::new(ClusterManager::new(ctx, engine, validator))
}

/// Run the background parts of the engine until `shutdown` resolves.
///
/// This starts the health server (when health state is configured), the
/// proxy cache garbage collector and the TTL controller. Cluster operations
/// themselves are started through the [`ClusterManager`].
pub async fn run(manager: Arc<ClusterManager>, shutdown: impl Future<Output = ()>) -> Result<()> {
    let ctx = manager.context().clone();

    let health_server = ctx.health_state.clone().map(|state| {
        let port = ctx.config.health_port;
        tokio::spawn(async move {
            if let Err(e) = health::run_health_server(state, port).await {
                error!(error = %e, "Health server error");
            }
        })
    });

    let proxy_gc = manager.start_proxy_gc();

    let ttl = TtlController::new(
        &ctx.config.ttl,
        ctx.repository.clone(),
        ctx.events.clone(),
        manager.clone(),
        ctx.health_state.clone(),
    );

    if let Some(state) = &ctx.health_state {
        state.set_ready(true).await;
    }
    info!("Cluster lifecycle engine started");

    let result = ttl.run(shutdown).await;

    proxy_gc.abort();
    if let Some(server) = health_server {
        server.abort();
    }
    info!("Cluster lifecycle engine stopped");
    result
}

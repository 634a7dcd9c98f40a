//! Post-provisioning steps.
//!
//! A fixed base sequence runs after every creation. Callers can pass a
//! parameter to a base hook by naming it, and request extra hooks that run
//! after the base sequence ordered by priority, lowest first.

mod autoscaler;
mod builtin;

pub use autoscaler::{AUTOSCALER_CHART, AUTOSCALER_RELEASE, autoscaler_values, deploy_cluster_autoscaler};
pub use builtin::{
    ConfigureSpotScheduling, CreateSystemNamespace, InstallClusterAutoscaler, InstallDashboard,
    InstallIngressController, LabelNamespaces,
};

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cluster::CommonCluster;
use crate::controller::context::Context;
use crate::controller::error::{Error, Result};

/// One post-provisioning step
#[async_trait]
pub trait PostHook: Send + Sync {
    fn name(&self) -> &'static str;

    /// Order among optional hooks, lower runs first
    fn priority(&self) -> i32 {
        0
    }

    async fn run(
        &self,
        ctx: &Context,
        cluster: &dyn CommonCluster,
        param: &serde_json::Value,
    ) -> Result<()>;
}

/// A hook resolved for execution
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlannedHook {
    pub name: String,
    pub param: serde_json::Value,
}

/// Known hooks and the base sequence
#[derive(Default, Clone)]
pub struct PostHookRegistry {
    hooks: BTreeMap<&'static str, Arc<dyn PostHook>>,
    base: Vec<&'static str>,
}

impl PostHookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in hooks
    pub fn with_builtin_hooks() -> Self {
        Self::new()
            .with_base_hook(Arc::new(CreateSystemNamespace))
            .with_base_hook(Arc::new(LabelNamespaces))
            .with_base_hook(Arc::new(InstallClusterAutoscaler))
            .with_hook(Arc::new(ConfigureSpotScheduling))
            .with_hook(Arc::new(InstallDashboard))
            .with_hook(Arc::new(InstallIngressController))
    }

    /// Add a hook that runs on every creation, after the existing base hooks
    pub fn with_base_hook(mut self, hook: Arc<dyn PostHook>) -> Self {
        let name = hook.name();
        self.hooks.insert(name, hook);
        if !self.base.contains(&name) {
            self.base.push(name);
        }
        self
    }

    /// Add a hook that runs only when requested
    pub fn with_hook(mut self, hook: Arc<dyn PostHook>) -> Self {
        self.hooks.insert(hook.name(), hook);
        self
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn PostHook>> {
        self.hooks
            .get(name)
            .cloned()
            .ok_or_else(|| Error::InvalidRequest(format!("unknown posthook {name:?}")))
    }

    pub fn base_hooks(&self) -> &[&'static str] {
        &self.base
    }

    /// Resolve the hooks to run for a request of hook name to parameter
    pub fn plan(&self, requested: &BTreeMap<String, serde_json::Value>) -> Result<Vec<PlannedHook>> {
        let mut plan: Vec<PlannedHook> = self
            .base
            .iter()
            .map(|name| PlannedHook {
                name: name.to_string(),
                param: requested
                    .get(*name)
                    .cloned()
                    .unwrap_or(serde_json::Value::Null),
            })
            .collect();

        let mut extra = Vec::new();
        for (name, param) in requested {
            if self.base.contains(&name.as_str()) {
                continue;
            }
            let hook = self.get(name)?;
            extra.push((hook.priority(), name.clone(), param.clone()));
        }
        extra.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        plan.extend(
            extra
                .into_iter()
                .map(|(_, name, param)| PlannedHook { name, param }),
        );
        Ok(plan)
    }
}

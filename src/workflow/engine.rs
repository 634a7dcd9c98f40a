//! In-process workflow engine.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

use super::{
    ActivityOptions, ErasedWorkflow, StartWorkflowOptions, Workflow, WorkflowClient,
    WorkflowContext, WorkflowRun,
};
use crate::config::WorkflowConfig;
use crate::controller::error::{Error, Result};
use crate::health::HealthState;

/// Runs registered workflows on the tokio runtime.
///
/// Activities share a fixed number of worker slots; an activity that cannot
/// get a slot within its schedule-to-start timeout fails with `Timeout`.
pub struct LocalWorkflowEngine {
    task_queue: String,
    workflows: HashMap<&'static str, Arc<dyn ErasedWorkflow>>,
    slots: Arc<Semaphore>,
    activity_options: ActivityOptions,
    health_state: Option<Arc<HealthState>>,
}

impl LocalWorkflowEngine {
    pub fn new(config: &WorkflowConfig, health_state: Option<Arc<HealthState>>) -> Self {
        Self {
            task_queue: config.task_queue.clone(),
            workflows: HashMap::new(),
            slots: Arc::new(Semaphore::new(config.activity_slots)),
            activity_options: ActivityOptions::from_config(config),
            health_state,
        }
    }

    /// Register a workflow under its name, replacing any previous one
    pub fn register<W: Workflow>(&mut self, workflow: W) -> &mut Self {
        self.workflows.insert(W::NAME, Arc::new(workflow));
        self
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.workflows.contains_key(name)
    }

    /// Activity slots not in use
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }
}

#[async_trait]
impl WorkflowClient for LocalWorkflowEngine {
    async fn execute_workflow(
        &self,
        options: StartWorkflowOptions,
        workflow: &str,
        input: serde_json::Value,
    ) -> Result<Box<dyn WorkflowRun>> {
        if options.task_queue != self.task_queue {
            return Err(Error::InvalidRequest(format!(
                "no worker polls task queue {}",
                options.task_queue
            )));
        }
        let (name, definition) = self
            .workflows
            .get_key_value(workflow)
            .map(|(name, definition)| (*name, definition.clone()))
            .ok_or_else(|| Error::NotFound(format!("workflow {workflow}")))?;

        let workflow_id = options
            .workflow_id
            .unwrap_or_else(|| format!("{name}-{}", Uuid::new_v4()));
        let run_id = Uuid::new_v4().to_string();
        let ctx = WorkflowContext::new(
            workflow_id.clone(),
            self.slots.clone(),
            self.activity_options.clone(),
        );
        let timeout = options.start_to_close_timeout;
        let health_state = self.health_state.clone();

        let handle = tokio::spawn(async move {
            info!(workflow = name, workflow_id = %ctx.workflow_id(), "Workflow started");
            let execution = AssertUnwindSafe(definition.run_erased(&ctx, input)).catch_unwind();
            let result = match tokio::time::timeout(timeout, execution).await {
                Err(_) => Err(Error::Timeout(format!(
                    "workflow {} did not finish within {timeout:?}",
                    ctx.workflow_id()
                ))),
                Ok(Err(panic)) => Err(Error::from_panic(panic)),
                Ok(Ok(result)) => result,
            };

            match &result {
                Ok(_) => info!(workflow = name, workflow_id = %ctx.workflow_id(), "Workflow completed"),
                Err(e) => {
                    error!(
                        workflow = name,
                        workflow_id = %ctx.workflow_id(),
                        reason = e.reason(),
                        error = %e,
                        "Workflow failed"
                    );
                    if let Some(state) = &health_state {
                        state.metrics.record_workflow_failure(name);
                    }
                }
            }
            result
        });

        Ok(Box::new(LocalWorkflowRun {
            workflow_id,
            run_id,
            handle: Some(handle),
        }))
    }
}

struct LocalWorkflowRun {
    workflow_id: String,
    run_id: String,
    handle: Option<JoinHandle<Result<serde_json::Value>>>,
}

#[async_trait]
impl WorkflowRun for LocalWorkflowRun {
    fn id(&self) -> &str {
        &self.workflow_id
    }

    fn run_id(&self) -> &str {
        &self.run_id
    }

    async fn get(&mut self) -> Result<serde_json::Value> {
        let handle = self.handle.take().ok_or_else(|| {
            Error::internal(format!(
                "result of workflow {} was already taken",
                self.workflow_id
            ))
        })?;
        match handle.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(Error::from_panic(e.into_panic())),
            Err(e) => Err(Error::internal(format!(
                "workflow {} was cancelled: {e}",
                self.workflow_id
            ))),
        }
    }
}

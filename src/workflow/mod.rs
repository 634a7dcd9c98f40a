//! Durable workflow port and the orchestration built on it.
//!
//! Lifecycle procedures are [`Workflow`]s composed of [`Activity`] calls.
//! Every activity must be safe to execute again after a partial failure,
//! since the engine retries it without the caller knowing. The
//! [`WorkflowClient`] port is what the manager talks to; any durable
//! execution substrate can sit behind it. [`LocalWorkflowEngine`] runs
//! workflows in process.

pub mod activities;
mod engine;
pub mod workflows;

pub use engine::LocalWorkflowEngine;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use rand::Rng;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::WorkflowConfig;
use crate::controller::error::{CLIENT_ERROR_REASON, Error, PANIC_REASON, Result};

/// Activity retry policy with exponential backoff
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    pub initial_interval: Duration,
    pub backoff_coefficient: f64,
    pub maximum_interval: Duration,
    /// Zero means unlimited
    pub maximum_attempts: u32,
    /// Error reasons that fail the activity immediately
    pub non_retryable_reasons: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(2),
            backoff_coefficient: 1.5,
            maximum_interval: Duration::from_secs(30),
            maximum_attempts: 5,
            non_retryable_reasons: vec![CLIENT_ERROR_REASON.to_string(), PANIC_REASON.to_string()],
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries
    pub fn no_retry() -> Self {
        Self {
            maximum_attempts: 1,
            ..Self::default()
        }
    }

    /// Whether a failed attempt (1-based) should be retried
    pub fn should_retry(&self, error: &Error, attempt: u32) -> bool {
        if self.maximum_attempts != 0 && attempt >= self.maximum_attempts {
            return false;
        }
        let reason = error.reason();
        !self.non_retryable_reasons.iter().any(|r| r == reason)
    }

    /// Delay before the attempt after `attempt`, with jitter
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let max = self.maximum_interval.as_secs_f64();
        let base = (self.initial_interval.as_secs_f64() * self.backoff_coefficient.powi(exponent))
            .min(max);
        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        Duration::from_secs_f64((base * jitter).min(max))
    }
}

/// Timeouts and retries of one activity call
#[derive(Clone, Debug)]
pub struct ActivityOptions {
    /// Time to wait for a free worker slot
    pub schedule_to_start_timeout: Duration,
    /// Time a single attempt may run
    pub start_to_close_timeout: Duration,
    pub retry_policy: RetryPolicy,
}

impl ActivityOptions {
    pub fn from_config(config: &WorkflowConfig) -> Self {
        Self {
            schedule_to_start_timeout: config.activity_schedule_to_start,
            start_to_close_timeout: config.activity_start_to_close,
            retry_policy: config.activity_retry.clone(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn with_start_to_close_timeout(mut self, timeout: Duration) -> Self {
        self.start_to_close_timeout = timeout;
        self
    }
}

/// Options for starting a workflow
#[derive(Clone, Debug)]
pub struct StartWorkflowOptions {
    /// Generated when not set
    pub workflow_id: Option<String>,
    pub task_queue: String,
    pub start_to_close_timeout: Duration,
}

impl StartWorkflowOptions {
    pub fn from_config(config: &WorkflowConfig) -> Self {
        Self {
            workflow_id: None,
            task_queue: config.task_queue.clone(),
            start_to_close_timeout: config.workflow_timeout,
        }
    }

    pub fn with_workflow_id(mut self, workflow_id: impl Into<String>) -> Self {
        self.workflow_id = Some(workflow_id.into());
        self
    }
}

/// Starts named workflows
#[async_trait]
pub trait WorkflowClient: Send + Sync {
    async fn execute_workflow(
        &self,
        options: StartWorkflowOptions,
        workflow: &str,
        input: serde_json::Value,
    ) -> Result<Box<dyn WorkflowRun>>;
}

/// Handle to a started workflow execution
#[async_trait]
pub trait WorkflowRun: Send {
    fn id(&self) -> &str;
    fn run_id(&self) -> &str;

    /// Wait for the workflow to finish. The result can be taken once.
    async fn get(&mut self) -> Result<serde_json::Value>;
}

/// Start a typed workflow by name
pub async fn start_workflow<W: Workflow>(
    client: &dyn WorkflowClient,
    options: StartWorkflowOptions,
    input: &W::Input,
) -> Result<Box<dyn WorkflowRun>> {
    let input = serde_json::to_value(input)?;
    let run = client.execute_workflow(options, W::NAME, input).await?;
    debug!(workflow = W::NAME, workflow_id = %run.id(), run_id = %run.run_id(), "Workflow started");
    Ok(run)
}

/// Wait for a run and decode its output
pub async fn get_result<O: DeserializeOwned>(run: &mut dyn WorkflowRun) -> Result<O> {
    let output = run.get().await?;
    Ok(serde_json::from_value(output)?)
}

/// A durable procedure
#[async_trait]
pub trait Workflow: Send + Sync + 'static {
    const NAME: &'static str;
    type Input: Serialize + DeserializeOwned + Send + Sync;
    type Output: Serialize + DeserializeOwned + Send;

    async fn run(&self, ctx: &WorkflowContext, input: Self::Input) -> Result<Self::Output>;
}

/// One retryable, timeout-bounded step of a workflow
#[async_trait]
pub trait Activity: Send + Sync + 'static {
    const NAME: &'static str;
    type Input: Clone + Send + Sync;
    type Output: Send;

    async fn execute(&self, input: Self::Input) -> Result<Self::Output>;
}

/// Workflow with its input and output erased to JSON
#[async_trait]
pub(crate) trait ErasedWorkflow: Send + Sync {
    async fn run_erased(
        &self,
        ctx: &WorkflowContext,
        input: serde_json::Value,
    ) -> Result<serde_json::Value>;
}

#[async_trait]
impl<W: Workflow> ErasedWorkflow for W {
    async fn run_erased(
        &self,
        ctx: &WorkflowContext,
        input: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let input: W::Input = serde_json::from_value(input)?;
        let output = self.run(ctx, input).await?;
        Ok(serde_json::to_value(output)?)
    }
}

/// Execution context handed to a running workflow
#[derive(Clone)]
pub struct WorkflowContext {
    workflow_id: String,
    slots: Arc<Semaphore>,
    activity_options: ActivityOptions,
}

impl WorkflowContext {
    pub fn new(
        workflow_id: impl Into<String>,
        slots: Arc<Semaphore>,
        activity_options: ActivityOptions,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            slots,
            activity_options,
        }
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn activity_options(&self) -> &ActivityOptions {
        &self.activity_options
    }

    /// Run an activity with the default options
    pub async fn execute_activity<A: Activity>(
        &self,
        activity: &A,
        input: A::Input,
    ) -> Result<A::Output> {
        let options = self.activity_options.clone();
        self.execute_activity_with(&options, activity, input).await
    }

    /// Run an activity, retrying according to its policy
    pub async fn execute_activity_with<A: Activity>(
        &self,
        options: &ActivityOptions,
        activity: &A,
        input: A::Input,
    ) -> Result<A::Output> {
        let mut attempt: u32 = 0;
        loop {
            attempt = attempt.saturating_add(1);
            let error = match self.attempt(options, activity, input.clone()).await {
                Ok(output) => return Ok(output),
                Err(e) => e,
            };

            if !options.retry_policy.should_retry(&error, attempt) {
                warn!(
                    workflow_id = %self.workflow_id,
                    activity = A::NAME,
                    attempt,
                    reason = error.reason(),
                    error = %error,
                    "Activity failed"
                );
                return Err(error);
            }

            let delay = options.retry_policy.backoff(attempt);
            warn!(
                workflow_id = %self.workflow_id,
                activity = A::NAME,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Activity failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn attempt<A: Activity>(
        &self,
        options: &ActivityOptions,
        activity: &A,
        input: A::Input,
    ) -> Result<A::Output> {
        let _permit = tokio::time::timeout(options.schedule_to_start_timeout, self.slots.acquire())
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "activity {} was not scheduled within {:?}",
                    A::NAME,
                    options.schedule_to_start_timeout
                ))
            })?
            .map_err(|_| Error::internal("activity worker pool is closed"))?;

        debug!(workflow_id = %self.workflow_id, activity = A::NAME, "Activity started");
        let execution = AssertUnwindSafe(activity.execute(input)).catch_unwind();
        match tokio::time::timeout(options.start_to_close_timeout, execution).await {
            Err(_) => Err(Error::Timeout(format!(
                "activity {} did not finish within {:?}",
                A::NAME,
                options.start_to_close_timeout
            ))),
            Ok(Err(panic)) => Err(Error::from_panic(panic)),
            Ok(Ok(result)) => result,
        }
    }

    /// Run a workflow as a child of this one
    pub async fn execute_child_workflow<W: Workflow>(
        &self,
        workflow: &W,
        input: W::Input,
    ) -> Result<W::Output> {
        let child = WorkflowContext {
            workflow_id: format!("{}/{}", self.workflow_id, W::NAME),
            ..self.clone()
        };
        info!(workflow_id = %child.workflow_id, workflow = W::NAME, "Child workflow started");
        let result = workflow.run(&child, input).await;
        if let Err(e) = &result {
            warn!(workflow_id = %child.workflow_id, error = %e, "Child workflow failed");
        }
        result
    }
}

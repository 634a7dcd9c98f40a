//! Process configuration.
//!
//! Built once at startup, from environment variables with defaults, and
//! passed to the components that need it.

use std::time::Duration;

use crate::controller::error::{Error, Result};
use crate::workflow::RetryPolicy;

/// Prefix for every environment variable read by [`Config::from_env`]
pub const ENV_PREFIX: &str = "LIFECYCLE_";

/// Workflow engine settings
#[derive(Clone, Debug)]
pub struct WorkflowConfig {
    /// Task queue workflows are started on
    pub task_queue: String,
    /// Start-to-close timeout of a whole workflow run
    pub workflow_timeout: Duration,
    /// Activities allowed to execute at the same time
    pub activity_slots: usize,
    /// Time an activity may wait for a free slot
    pub activity_schedule_to_start: Duration,
    /// Time a single activity attempt may run
    pub activity_start_to_close: Duration,
    /// Retry policy applied to activities
    pub activity_retry: RetryPolicy,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            task_queue: "cluster-lifecycle".to_string(),
            workflow_timeout: Duration::from_secs(3 * 60 * 60),
            activity_slots: 32,
            activity_schedule_to_start: Duration::from_secs(10 * 60),
            activity_start_to_close: Duration::from_secs(20 * 60),
            activity_retry: RetryPolicy::default(),
        }
    }
}

/// TTL controller settings
#[derive(Clone, Debug)]
pub struct TtlConfig {
    /// Delay before a cluster that has not expired yet is checked again
    pub recheck_interval: Duration,
    /// Backoff after the first processing error for a cluster
    pub retry_base_delay: Duration,
    /// Backoff cap for repeated processing errors
    pub retry_max_delay: Duration,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            recheck_interval: Duration::from_secs(60),
            retry_base_delay: Duration::from_millis(5),
            retry_max_delay: Duration::from_secs(1000),
        }
    }
}

/// Kube API proxy cache settings
#[derive(Clone, Debug)]
pub struct ProxyConfig {
    pub entry_ttl: Duration,
    pub gc_interval: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            entry_ttl: Duration::from_secs(30 * 60),
            gc_interval: Duration::from_secs(60),
        }
    }
}

/// Settings applied to managed clusters
#[derive(Clone, Debug)]
pub struct KubernetesConfig {
    /// Namespace system components are installed into
    pub system_namespace: String,
    /// Field manager used for server-side apply
    pub field_manager: String,
}

impl Default for KubernetesConfig {
    fn default() -> Self {
        Self {
            system_namespace: "lifecycle-system".to_string(),
            field_manager: "cluster-lifecycle".to_string(),
        }
    }
}

/// Complete configuration
#[derive(Clone, Debug)]
pub struct Config {
    pub workflow: WorkflowConfig,
    pub ttl: TtlConfig,
    pub proxy: ProxyConfig,
    pub kubernetes: KubernetesConfig,
    /// Port of the health and metrics server
    pub health_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workflow: WorkflowConfig::default(),
            ttl: TtlConfig::default(),
            proxy: ProxyConfig::default(),
            kubernetes: KubernetesConfig::default(),
            health_port: 8080,
        }
    }
}

impl Config {
    /// Load from `LIFECYCLE_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary variable lookup, falling back to defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };
        let mut config = Config::default();

        if let Some(queue) = env.string("TASK_QUEUE") {
            config.workflow.task_queue = queue;
        }
        env.secs("WORKFLOW_TIMEOUT_SECS", &mut config.workflow.workflow_timeout)?;
        if let Some(slots) = env.parse::<usize>("ACTIVITY_SLOTS")? {
            config.workflow.activity_slots = slots;
        }
        env.secs(
            "ACTIVITY_SCHEDULE_TO_START_SECS",
            &mut config.workflow.activity_schedule_to_start,
        )?;
        env.secs(
            "ACTIVITY_START_TO_CLOSE_SECS",
            &mut config.workflow.activity_start_to_close,
        )?;
        if let Some(attempts) = env.parse::<u32>("ACTIVITY_MAX_ATTEMPTS")? {
            config.workflow.activity_retry.maximum_attempts = attempts;
        }

        env.secs("TTL_RECHECK_SECS", &mut config.ttl.recheck_interval)?;
        env.secs("TTL_RETRY_MAX_SECS", &mut config.ttl.retry_max_delay)?;

        env.secs("PROXY_ENTRY_TTL_SECS", &mut config.proxy.entry_ttl)?;
        env.secs("PROXY_GC_INTERVAL_SECS", &mut config.proxy.gc_interval)?;

        if let Some(ns) = env.string("SYSTEM_NAMESPACE") {
            config.kubernetes.system_namespace = ns;
        }
        if let Some(manager) = env.string("FIELD_MANAGER") {
            config.kubernetes.field_manager = manager;
        }
        if let Some(port) = env.parse::<u16>("HEALTH_PORT")? {
            config.health_port = port;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.workflow.task_queue.trim().is_empty() {
            return Err(Error::Config("task queue must not be empty".into()));
        }
        if self.workflow.activity_slots == 0 {
            return Err(Error::Config("activity slots must be positive".into()));
        }
        let durations = [
            ("workflow timeout", self.workflow.workflow_timeout),
            (
                "activity schedule-to-start timeout",
                self.workflow.activity_schedule_to_start,
            ),
            (
                "activity start-to-close timeout",
                self.workflow.activity_start_to_close,
            ),
            ("TTL recheck interval", self.ttl.recheck_interval),
            ("proxy entry TTL", self.proxy.entry_ttl),
            ("proxy GC interval", self.proxy.gc_interval),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(Error::Config(format!("{name} must be positive")));
            }
        }
        if self.workflow.activity_retry.maximum_attempts == 0 {
            return Err(Error::Config("activity attempts must be positive".into()));
        }
        Ok(())
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(&format!("{ENV_PREFIX}{key}")).filter(|v| !v.trim().is_empty())
    }

    fn parse<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.string(key)
            .map(|raw| {
                raw.trim()
                    .parse::<T>()
                    .map_err(|e| Error::Config(format!("{ENV_PREFIX}{key}={raw:?}: {e}")))
            })
            .transpose()
    }

    fn secs(&self, key: &str, target: &mut Duration) -> Result<()> {
        if let Some(secs) = self.parse::<u64>(key)? {
            *target = Duration::from_secs(secs);
        }
        Ok(())
    }
}

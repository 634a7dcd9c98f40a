//! Error types for cluster lifecycle operations.
//!
//! Errors carry a classification used by the workflow engine to decide
//! whether an activity should be retried, and a stable `reason` string
//! that callers can match on without parsing messages.

use std::any::Any;

use thiserror::Error;

use crate::model::{ClusterId, OrganizationId, SecretType};

/// Reason attached to errors that come from the caller rather than the system.
pub const CLIENT_ERROR_REASON: &str = "ClientError";
/// Reason attached to panics caught inside a workflow or activity.
pub const PANIC_REASON: &str = "Panic";

/// Error type for lifecycle operations
#[derive(Error, Debug)]
pub enum Error {
    /// Request was malformed or failed validation
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Cluster is not in a state that allows the operation
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    /// Requested entity does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// A live cluster with the same name exists in the organization
    #[error("cluster {name:?} already exists in organization {organization_id}")]
    AlreadyExists {
        organization_id: OrganizationId,
        name: String,
    },

    /// Secret is of the wrong kind for the requested cloud
    #[error("secret {secret_id} has type {actual}, expected {expected}")]
    SecretTypeMismatch {
        secret_id: String,
        expected: SecretType,
        actual: SecretType,
    },

    /// Backend does not implement the operation
    #[error("operation not supported: {0}")]
    NotSupported(String),

    /// Operation did not finish in time
    #[error("timed out: {0}")]
    Timeout(String),

    /// Panic caught at a workflow or background task boundary
    #[error("panic: {0}")]
    Panic(String),

    /// Unexpected internal failure
    #[error("internal error: {0}")]
    Internal(String),

    /// Error tagged with the cluster it happened on
    #[error("cluster {cluster_id} (organization {organization_id}): {source}")]
    Cluster {
        cluster_id: ClusterId,
        organization_id: OrganizationId,
        #[source]
        source: Box<Error>,
    },

    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Kubeconfig could not be loaded
    #[error("kubeconfig error: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid process configuration
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Build an internal error from any message
    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal(message.into())
    }

    /// Tag this error with the cluster it occurred on.
    ///
    /// Already tagged errors are returned unchanged.
    pub fn with_cluster(self, cluster_id: ClusterId, organization_id: OrganizationId) -> Self {
        match self {
            tagged @ Error::Cluster { .. } => tagged,
            other => Error::Cluster {
                cluster_id,
                organization_id,
                source: Box::new(other),
            },
        }
    }

    /// Strip cluster tagging and return the underlying error
    pub fn root(&self) -> &Error {
        match self {
            Error::Cluster { source, .. } => source.root(),
            other => other,
        }
    }

    /// Check if this error indicates a not-found condition
    pub fn is_not_found(&self) -> bool {
        match self.root() {
            Error::NotFound(_) => true,
            Error::Kube(kube::Error::Api(e)) => e.code == 404,
            _ => false,
        }
    }

    /// Check if this error was caused by the caller
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.root(),
            Error::InvalidRequest(_)
                | Error::PreconditionFailed(_)
                | Error::NotFound(_)
                | Error::AlreadyExists { .. }
                | Error::SecretTypeMismatch { .. }
                | Error::NotSupported(_)
        )
    }

    /// Check if this error should be retried
    pub fn is_retryable(&self) -> bool {
        match self.root() {
            Error::Kube(e) => {
                // Retry on network errors, rate limiting, and server errors
                matches!(
                    e,
                    kube::Error::Api(api_err) if api_err.code >= 500 || api_err.code == 429
                ) || matches!(e, kube::Error::Service(_))
            }
            Error::Timeout(_) | Error::Internal(_) => true,
            Error::Panic(_) | Error::Serialization(_) | Error::Config(_) => false,
            Error::Kubeconfig(_) => false,
            root => !root.is_client_error(),
        }
    }

    /// Stable classification string used by retry policies
    pub fn reason(&self) -> &'static str {
        match self.root() {
            Error::Panic(_) => PANIC_REASON,
            Error::Timeout(_) => "Timeout",
            Error::Kube(_) => "KubernetesError",
            Error::Kubeconfig(_) => "KubeconfigError",
            Error::Serialization(_) => "SerializationError",
            Error::Config(_) => "ConfigError",
            Error::Internal(_) => "InternalError",
            root if root.is_client_error() => CLIENT_ERROR_REASON,
            _ => "Unknown",
        }
    }

    /// Convert a caught panic payload into an error
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic payload".to_string()
        };
        Error::Panic(message)
    }
}

/// Result type alias for lifecycle operations
pub type Result<T> = std::result::Result<T, Error>;

//! Finite state machine for the cluster status field.
//!
//! Every status write goes through this table. Transitions that are not
//! listed are rejected, which keeps concurrent workflows from moving a
//! cluster out of a state another operation owns.
//!
//! ## Paths
//!
//! Creating → {Running, Warning, Error}
//! {Running, Warning} → Updating → {Running, Warning, Error}
//! {Running, Warning, Error} → Deleting → (record removed)
//!
//! Forced deletion additionally enters Deleting from Creating and Updating,
//! and a failed non-forced deletion leaves the cluster in Error.

use std::fmt;
use std::sync::LazyLock;

use crate::model::ClusterStatus;

/// Events that move a cluster between statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusEvent {
    /// Provisioning or update finished and every step succeeded
    Completed,
    /// Finished, but some steps failed while the cluster stays reachable
    PartiallyCompleted,
    /// A step failed and the operation was aborted
    Failed,
    /// A node pool or scaling change was accepted
    UpdateRequested,
    /// Deletion requested on a settled cluster
    DeletionRequested,
    /// Deletion requested regardless of the operation in progress
    ForcedDeletion,
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusEvent::Completed => write!(f, "Completed"),
            StatusEvent::PartiallyCompleted => write!(f, "PartiallyCompleted"),
            StatusEvent::Failed => write!(f, "Failed"),
            StatusEvent::UpdateRequested => write!(f, "UpdateRequested"),
            StatusEvent::DeletionRequested => write!(f, "DeletionRequested"),
            StatusEvent::ForcedDeletion => write!(f, "ForcedDeletion"),
        }
    }
}

/// A state transition definition
#[derive(Debug)]
pub struct Transition {
    pub from: ClusterStatus,
    pub to: ClusterStatus,
    pub event: StatusEvent,
    pub description: &'static str,
}

impl Transition {
    const fn new(
        from: ClusterStatus,
        to: ClusterStatus,
        event: StatusEvent,
        description: &'static str,
    ) -> Self {
        Self {
            from,
            to,
            event,
            description,
        }
    }
}

/// Result of attempting a state transition
#[derive(Debug, PartialEq, Eq)]
pub enum TransitionResult {
    Success {
        from: ClusterStatus,
        to: ClusterStatus,
        event: StatusEvent,
        description: &'static str,
    },
    InvalidTransition {
        current: ClusterStatus,
        event: StatusEvent,
    },
}

/// Status state machine
pub struct ClusterStateMachine {
    transitions: Vec<Transition>,
}

static SHARED: LazyLock<ClusterStateMachine> = LazyLock::new(ClusterStateMachine::new);

impl Default for ClusterStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterStateMachine {
    /// Create a state machine with the full transition table
    pub fn new() -> Self {
        use ClusterStatus::*;
        use StatusEvent::*;

        Self {
            transitions: vec![
                // Creating
                Transition::new(Creating, Running, Completed, "Cluster provisioned"),
                Transition::new(
                    Creating,
                    Warning,
                    PartiallyCompleted,
                    "Cluster provisioned with failed steps",
                ),
                Transition::new(Creating, Error, Failed, "Provisioning failed"),
                Transition::new(
                    Creating,
                    Deleting,
                    ForcedDeletion,
                    "Forced deletion during provisioning",
                ),
                // Running
                Transition::new(Running, Updating, UpdateRequested, "Update started"),
                Transition::new(Running, Deleting, DeletionRequested, "Deletion started"),
                Transition::new(Running, Deleting, ForcedDeletion, "Forced deletion"),
                // Warning
                Transition::new(Warning, Updating, UpdateRequested, "Update started"),
                Transition::new(Warning, Deleting, DeletionRequested, "Deletion started"),
                Transition::new(Warning, Deleting, ForcedDeletion, "Forced deletion"),
                // Updating
                Transition::new(Updating, Running, Completed, "Update finished"),
                Transition::new(
                    Updating,
                    Warning,
                    PartiallyCompleted,
                    "Update finished with failed node pools",
                ),
                Transition::new(Updating, Error, Failed, "Update failed"),
                Transition::new(Updating, Deleting, ForcedDeletion, "Forced deletion during update"),
                // Error
                Transition::new(Error, Deleting, DeletionRequested, "Deleting failed cluster"),
                Transition::new(Error, Deleting, ForcedDeletion, "Forced deletion of failed cluster"),
                // Deleting ends with record removal, or Error when a step aborts
                Transition::new(Deleting, Error, Failed, "Deletion failed"),
            ],
        }
    }

    /// Process-wide instance of the table
    pub fn shared() -> &'static ClusterStateMachine {
        &SHARED
    }

    /// Attempt to transition to a new status based on an event
    pub fn transition(&self, current: ClusterStatus, event: StatusEvent) -> TransitionResult {
        match self
            .transitions
            .iter()
            .find(|t| t.from == current && t.event == event)
        {
            Some(t) => TransitionResult::Success {
                from: t.from,
                to: t.to,
                event,
                description: t.description,
            },
            None => TransitionResult::InvalidTransition { current, event },
        }
    }

    /// Check if an event is valid in the given status
    pub fn can_transition(&self, from: ClusterStatus, event: StatusEvent) -> bool {
        self.transitions
            .iter()
            .any(|t| t.from == from && t.event == event)
    }

    /// Check if any event moves `from` directly to `to`
    pub fn allows(&self, from: ClusterStatus, to: ClusterStatus) -> bool {
        self.transitions.iter().any(|t| t.from == from && t.to == to)
    }

    /// Get all valid events for a given status
    pub fn valid_events(&self, status: ClusterStatus) -> Vec<StatusEvent> {
        self.transitions
            .iter()
            .filter(|t| t.from == status)
            .map(|t| t.event)
            .collect()
    }
}

//! Lifecycle workflow definitions.

mod create;
mod delete;
mod posthook;
mod setup;
mod update;

pub use create::{CreateClusterWorkflow, CreateClusterWorkflowInput};
pub use delete::{DeleteClusterWorkflow, DeleteClusterWorkflowInput};
pub use posthook::{PostHookWorkflow, PostHookWorkflowInput};
pub use setup::{ClusterSetupWorkflow, ClusterSetupWorkflowInput};
pub use update::{UpdateClusterWorkflow, UpdateClusterWorkflowInput, UpdateClusterWorkflowOutput};

use super::LocalWorkflowEngine;
use super::activities::Activities;

/// Register every lifecycle workflow with an engine
pub fn register_workflows(engine: &mut LocalWorkflowEngine, activities: &Activities) {
    engine
        .register(CreateClusterWorkflow::new(activities.clone()))
        .register(ClusterSetupWorkflow::new(activities.clone()))
        .register(PostHookWorkflow::new(activities.clone()))
        .register(UpdateClusterWorkflow::new(activities.clone()))
        .register(DeleteClusterWorkflow::new(activities.clone()));
}

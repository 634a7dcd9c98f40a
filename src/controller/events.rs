//! In-process notifications about cluster records.

use tokio::sync::broadcast;
use tracing::trace;

use crate::model::ClusterId;

const CHANNEL_CAPACITY: usize = 256;

/// Change to a cluster record
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClusterEvent {
    Created(ClusterId),
    Updated(ClusterId),
    Deleted(ClusterId),
}

impl ClusterEvent {
    pub fn cluster_id(&self) -> ClusterId {
        match self {
            ClusterEvent::Created(id) | ClusterEvent::Updated(id) | ClusterEvent::Deleted(id) => {
                *id
            }
        }
    }
}

/// Broadcast bus for [`ClusterEvent`]s. Slow subscribers lose the oldest events.
#[derive(Clone)]
pub struct ClusterEvents {
    sender: broadcast::Sender<ClusterEvent>,
}

impl Default for ClusterEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterEvents {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ClusterEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: ClusterEvent) {
        // no subscribers is fine
        if self.sender.send(event).is_err() {
            trace!(?event, "No event subscribers");
        }
    }
}

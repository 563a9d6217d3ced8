//! Realtime broadcast hub fanning engine events out to subscribers.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::models::{Conflict, DaemonStatus, Session, Side};

/// Events buffered per subscriber before the slowest one starts losing the oldest
pub const DEFAULT_CAPACITY: usize = 256;

/// How a session differs from the previous snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Removed,
    Changed,
}

/// Typed push event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum HubEvent {
    /// A session appeared, disappeared, or changed status/connectivity.
    /// Removed sessions carry their last observed state.
    SessionChanged { change: ChangeKind, session: Session },
    DaemonStatus { status: DaemonStatus },
    /// A session's conflicts now await a decision
    ConflictPrompt {
        session_name: String,
        conflicts: Vec<Conflict>,
    },
    ConflictResolved { session_name: String, winner: Side },
}

/// Cloneable handle over one broadcast channel
#[derive(Debug, Clone)]
pub struct Hub {
    tx: broadcast::Sender<HubEvent>,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl Hub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Deliver to every current subscriber. Returns how many received it.
    pub fn publish(&self, event: HubEvent) -> usize {
        match self.tx.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                tracing::trace!("No subscribers for hub event");
                0
            }
        }
    }

    /// New subscriber; sees only events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<HubEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

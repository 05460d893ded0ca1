//! Session lifecycle events
//!
//! Each manager owns its own bus; nothing here is process-global.

use crate::types::{PersistenceId, UserId};
use serde::Serialize;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 256;

/// Lifecycle notification. Token strings are never carried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Created {
        user_id: UserId,
    },
    Persisted {
        user_id: UserId,
        persistence_id: PersistenceId,
    },
    Renewed {
        user_id: UserId,
        persistence_id: Option<PersistenceId>,
    },
    Evicted {
        user_id: UserId,
        persistence_id: Option<PersistenceId>,
    },
    Expired {
        user_id: UserId,
        persistence_id: Option<PersistenceId>,
    },
    Loaded {
        sessions: usize,
    },
}

/// Broadcast bus for [`SessionEvent`]s
#[derive(Debug, Clone)]
pub struct SessionEvents {
    sender: broadcast::Sender<SessionEvent>,
}

impl SessionEvents {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    /// Publish an event; having no subscribers is fine
    pub fn publish(&self, event: SessionEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

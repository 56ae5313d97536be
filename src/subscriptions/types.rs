//! Subscription types for the workflow event feed.

use crate::session::TransitionRecord;
use crate::types::{DataKey, SessionId, Timestamp};
use serde::{Deserialize, Serialize};

/// Configuration for a subscription.
#[derive(Clone, Debug)]
pub struct SubscriptionConfig {
    /// Max buffered events before dropping subscriber.
    /// Default: 1000
    pub buffer_size: usize,

    /// Filter criteria.
    pub filter: SubscriptionFilter,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1000,
            filter: SubscriptionFilter::all(),
        }
    }
}

/// Filter criteria for subscriptions.
#[derive(Clone, Debug, Default)]
pub struct SubscriptionFilter {
    /// Only these sessions (None = every session).
    pub session_ids: Option<Vec<SessionId>>,

    /// Include transition events.
    pub include_transitions: bool,

    /// Include data slot writes.
    pub include_data_updates: bool,

    /// Include session creation and eviction.
    pub include_lifecycle: bool,
}

impl SubscriptionFilter {
    /// Transitions of every session (the audit trail).
    pub fn transitions() -> Self {
        Self {
            include_transitions: true,
            ..Default::default()
        }
    }

    /// Everything that happens to specific sessions.
    pub fn sessions(ids: Vec<SessionId>) -> Self {
        Self {
            session_ids: Some(ids),
            ..Self::all()
        }
    }

    /// Session creation and eviction only.
    pub fn lifecycle() -> Self {
        Self {
            include_lifecycle: true,
            ..Default::default()
        }
    }

    /// Subscribe to everything.
    pub fn all() -> Self {
        Self {
            session_ids: None,
            include_transitions: true,
            include_data_updates: true,
            include_lifecycle: true,
        }
    }

    pub(crate) fn matches_session(&self, id: &SessionId) -> bool {
        match &self.session_ids {
            Some(ids) => ids.contains(id),
            None => true,
        }
    }
}

/// Events emitted to subscribers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    /// A session was started (or restarted by an explicit create).
    SessionCreated {
        session_id: SessionId,
        at: Timestamp,
    },

    /// A record was appended to a session's history.
    Transition {
        session_id: SessionId,
        record: TransitionRecord,
    },

    /// A data slot was overwritten.
    DataUpdated {
        session_id: SessionId,
        key: DataKey,
    },

    /// A session left the store.
    SessionEvicted {
        session_id: SessionId,
        reason: EvictionReason,
    },

    /// Subscription was dropped.
    Dropped {
        reason: DropReason,
    },
}

impl WorkflowEvent {
    fn session_id(&self) -> Option<&SessionId> {
        match self {
            WorkflowEvent::SessionCreated { session_id, .. }
            | WorkflowEvent::Transition { session_id, .. }
            | WorkflowEvent::DataUpdated { session_id, .. }
            | WorkflowEvent::SessionEvicted { session_id, .. } => Some(session_id),
            WorkflowEvent::Dropped { .. } => None,
        }
    }

    pub(crate) fn matches(&self, filter: &SubscriptionFilter) -> bool {
        let wanted = match self {
            WorkflowEvent::Transition { .. } => filter.include_transitions,
            WorkflowEvent::DataUpdated { .. } => filter.include_data_updates,
            WorkflowEvent::SessionCreated { .. } | WorkflowEvent::SessionEvicted { .. } => {
                filter.include_lifecycle
            }
            WorkflowEvent::Dropped { .. } => true,
        };
        wanted
            && self
                .session_id()
                .map(|id| filter.matches_session(id))
                .unwrap_or(true)
    }
}

/// Why a session left the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionReason {
    /// Least recently used session pushed out by capacity.
    Capacity,
    /// Idle longer than the configured time-to-live.
    Expired,
}

/// Why a subscription was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Explicitly unsubscribed.
    Unsubscribed,
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Handle to manage a subscription.
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<WorkflowEvent>,
}

impl SubscriptionHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<WorkflowEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<WorkflowEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<WorkflowEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything currently buffered.
    pub fn drain(&self) -> Vec<WorkflowEvent> {
        self.receiver.try_iter().collect()
    }
}

//! A single user's journey through the workflow.

use crate::error::{OrchestratorError, Result};
use crate::graph::WorkflowState;
use crate::types::{DataKey, SessionId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Number of history records included in a [`StatusView`].
pub const STATUS_HISTORY_WINDOW: usize = 5;

/// Reason recorded for the initial history entry.
const CREATED_REASON: &str = "Session created";

/// One successful edge traversal. Never edited once appended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// State before the transition (`None` for the creation record).
    pub from: Option<WorkflowState>,
    pub to: WorkflowState,
    pub reason: String,
    pub timestamp: Timestamp,
}

/// Read-only projection of a session for status queries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusView {
    pub session_id: SessionId,
    pub current_state: WorkflowState,
    pub state_description: String,
    pub next_valid_states: Vec<WorkflowState>,
    /// Per-slot flag: does the slot hold a non-empty value.
    pub data_collected: BTreeMap<DataKey, bool>,
    /// The last [`STATUS_HISTORY_WINDOW`] records, oldest first.
    pub history: Vec<TransitionRecord>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Current state, accumulated data and transition history of one user.
///
/// History only grows, and its first record is always the creation record
/// (`from = None, to = Intake`).
#[derive(Clone, Debug, Serialize)]
pub struct Session {
    id: SessionId,
    current_state: WorkflowState,
    data: BTreeMap<DataKey, Value>,
    history: Vec<TransitionRecord>,
    created_at: Timestamp,
    updated_at: Timestamp,
    /// Slots written since the store last drained them.
    #[serde(skip)]
    written_keys: Vec<DataKey>,
}

impl Session {
    /// Start a new session at `Intake`.
    pub fn new(id: SessionId) -> Self {
        let now = Timestamp::now();
        Self {
            id,
            current_state: WorkflowState::Intake,
            data: BTreeMap::new(),
            history: vec![TransitionRecord {
                from: None,
                to: WorkflowState::Intake,
                reason: CREATED_REASON.to_string(),
                timestamp: now,
            }],
            created_at: now,
            updated_at: now,
            written_keys: Vec::new(),
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn current_state(&self) -> WorkflowState {
        self.current_state
    }

    pub fn history(&self) -> &[TransitionRecord] {
        &self.history
    }

    pub fn data(&self) -> &BTreeMap<DataKey, Value> {
        &self.data
    }

    /// Value stored in a slot, if any has been written.
    pub fn get(&self, key: DataKey) -> Option<&Value> {
        self.data.get(&key)
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn updated_at(&self) -> Timestamp {
        self.updated_at
    }

    /// Move to `target` if the graph permits it.
    ///
    /// Returns `false` and leaves state and history untouched otherwise.
    pub fn attempt_transition(&mut self, target: WorkflowState, reason: &str) -> bool {
        self.try_transition(target, reason).is_ok()
    }

    /// Like [`attempt_transition`](Self::attempt_transition) but reports the
    /// rejected edge.
    pub fn try_transition(&mut self, target: WorkflowState, reason: &str) -> Result<()> {
        let from = self.current_state;
        if !from.can_transition_to(target) {
            return Err(OrchestratorError::TransitionRejected { from, to: target });
        }

        self.current_state = target;
        self.append_record(Some(from), target, reason);
        Ok(())
    }

    /// Append a self-loop record documenting a repeated request for the
    /// current state. State does not change.
    pub(crate) fn record_repeat(&mut self, reason: &str) {
        let state = self.current_state;
        self.append_record(Some(state), state, reason);
    }

    /// Overwrite one slot.
    pub fn set(&mut self, key: DataKey, value: Value) {
        self.data.insert(key, value);
        self.written_keys.push(key);
        self.touch();
    }

    pub(crate) fn take_written_keys(&mut self) -> Vec<DataKey> {
        std::mem::take(&mut self.written_keys)
    }

    /// Overwrite one slot named by its wire key. Keys outside the closed set
    /// fail with [`OrchestratorError::UnknownDataKey`].
    pub fn set_data(&mut self, key: &str, value: Value) -> Result<DataKey> {
        let key: DataKey = key.parse()?;
        self.set(key, value);
        Ok(key)
    }

    /// Whether a slot holds a non-empty value.
    pub fn has_data(&self, key: DataKey) -> bool {
        self.data.get(&key).map(is_present).unwrap_or(false)
    }

    /// Build the status projection.
    pub fn status_view(&self) -> StatusView {
        let window_start = self.history.len().saturating_sub(STATUS_HISTORY_WINDOW);
        StatusView {
            session_id: self.id.clone(),
            current_state: self.current_state,
            state_description: self.current_state.describe().to_string(),
            next_valid_states: self.current_state.allowed_next().to_vec(),
            data_collected: DataKey::ALL
                .iter()
                .map(|&key| (key, self.has_data(key)))
                .collect(),
            history: self.history[window_start..].to_vec(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    fn append_record(&mut self, from: Option<WorkflowState>, to: WorkflowState, reason: &str) {
        self.touch();
        self.history.push(TransitionRecord {
            from,
            to,
            reason: reason.to_string(),
            timestamp: self.updated_at,
        });
    }

    /// Advance `updated_at`, never moving it backwards.
    fn touch(&mut self) {
        self.updated_at = self.updated_at.max(Timestamp::now());
    }
}

/// Null, "", [] and {} count as absent.
fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

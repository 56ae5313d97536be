//! Orchestrator tying the session store and step processor together.

use crate::error::Result;
use crate::session::{Session, StatusView};
use crate::steps::{ProcessorConfig, StepProcessor, StepResult};
use crate::store::{SessionStore, StoreConfig};
use crate::subscriptions::{SubscriptionConfig, SubscriptionHandle, SubscriptionId};
use crate::types::DataKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Orchestrator configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub store: StoreConfig,
    pub processor: ProcessorConfig,
}

impl OrchestratorConfig {
    /// Parse a JSON config document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// The workflow orchestrator.
///
/// Provides a unified interface for:
/// - Creating and looking up sessions
/// - Applying named steps
/// - Status queries and direct data slot access
/// - Subscribing to the transition feed
pub struct Orchestrator {
    store: Arc<SessionStore>,
    processor: StepProcessor,
}

impl Orchestrator {
    /// Create an orchestrator with its own store.
    pub fn new(config: OrchestratorConfig) -> Self {
        let store = Arc::new(SessionStore::new(config.store));
        Self::with_store(store, config.processor)
    }

    /// Create an orchestrator over an existing store.
    pub fn with_store(store: Arc<SessionStore>, config: ProcessorConfig) -> Self {
        let processor = StepProcessor::new(Arc::clone(&store), config);
        Self { store, processor }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    // --- Sessions ---

    /// Start a new session, generating an id when none is given.
    pub fn create_session(&self, id: Option<&str>) -> Result<Session> {
        self.store.create(id)
    }

    pub fn get_or_create_session(&self, id: &str) -> Result<Session> {
        self.store.get_or_create(id)
    }

    /// Snapshot of an existing session, `None` when there is none.
    pub fn get_session(&self, id: &str) -> Option<Session> {
        self.store.get(id)
    }

    // --- Steps ---

    pub fn process_step(
        &self,
        session_id: &str,
        step: &str,
        payload: &Value,
    ) -> Result<StepResult> {
        self.processor.process_step(session_id, step, payload)
    }

    pub fn fail_session(&self, session_id: &str, reason: &str) -> Result<StepResult> {
        self.processor.fail_session(session_id, reason)
    }

    pub fn restart_session(&self, session_id: &str, reason: &str) -> Result<StepResult> {
        self.processor.restart_session(session_id, reason)
    }

    // --- Queries ---

    /// Status of an existing session. Never creates one.
    pub fn get_status(&self, session_id: &str) -> Result<StatusView> {
        self.store.read(session_id, Session::status_view)
    }

    /// Current value of one data slot.
    pub fn session_data(&self, session_id: &str, key: &str) -> Result<Option<Value>> {
        let key: DataKey = key.parse()?;
        self.store
            .read(session_id, |session| session.get(key).cloned())
    }

    // --- Data ---

    /// Overwrite one data slot, creating the session on first reference.
    ///
    /// Collaborator results (intent, matched schemes, eligibility, OCR
    /// output) are written through here.
    pub fn set_data(&self, session_id: &str, key: &str, value: Value) -> Result<()> {
        let key: DataKey = key.parse()?;
        self.store.update_or_create(session_id, |session| {
            session.set(key, value);
            tracing::debug!(session_id = %session.id(), %key, "data slot written");
        })
    }

    // --- Maintenance ---

    /// Drop sessions idle past the configured TTL.
    pub fn purge_expired(&self) -> usize {
        self.store.purge_expired()
    }

    pub fn subscribe(&self, config: SubscriptionConfig) -> SubscriptionHandle {
        self.store.subscribe(config)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.store.unsubscribe(id)
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(OrchestratorConfig::default())
    }
}

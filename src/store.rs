//! Session store: the process-wide registry of sessions.

use crate::error::{OrchestratorError, Result};
use crate::session::Session;
use crate::subscriptions::{
    EvictionReason, SubscriptionConfig, SubscriptionHandle, SubscriptionId, SubscriptionManager,
    WorkflowEvent,
};
use crate::types::{SessionId, Timestamp};
use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Store configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Maximum number of live sessions. The least recently used idle session
    /// is evicted to make room. `None` keeps every session.
    pub max_sessions: Option<usize>,

    /// Idle time-to-live in seconds, measured from a session's last access.
    /// A session with a request in flight never expires.
    pub session_ttl_secs: Option<u64>,

    /// Default buffer size for event subscribers.
    pub event_buffer_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_sessions: None,
            session_ttl_secs: None,
            event_buffer_size: 1000,
        }
    }
}

impl StoreConfig {
    pub fn session_ttl(&self) -> Option<Duration> {
        self.session_ttl_secs.map(Duration::from_secs)
    }
}

/// One registry slot. `last_access` is kept outside the session so expiry
/// checks never need the session lock.
///
/// The registry owns one reference to `session`; every request that resolved
/// the entry holds another until it finishes.
#[derive(Clone)]
struct Entry {
    session: Arc<Mutex<Session>>,
    last_access: Arc<AtomicI64>,
}

impl Entry {
    fn new(session: Session) -> Self {
        let last_access = Arc::new(AtomicI64::new(session.updated_at().0));
        Self {
            session: Arc::new(Mutex::new(session)),
            last_access,
        }
    }

    fn last_access(&self) -> Timestamp {
        Timestamp(self.last_access.load(Ordering::Acquire))
    }

    fn touch(&self, now: Timestamp) {
        self.last_access.fetch_max(now.0, Ordering::AcqRel);
    }

    /// A request outside the registry still holds this session.
    fn in_use(&self) -> bool {
        Arc::strong_count(&self.session) > 1
    }

    fn is_expired(&self, ttl: Option<Duration>, now: Timestamp) -> bool {
        match ttl {
            Some(ttl) => now.since(self.last_access()) > ttl,
            None => false,
        }
    }

    /// Expired and safe to drop.
    fn is_evictable(&self, ttl: Option<Duration>, now: Timestamp) -> bool {
        self.is_expired(ttl, now) && !self.in_use()
    }
}

/// Keyed registry of sessions.
///
/// The registry lock is only held for lookup, insertion and eviction; each
/// session has its own lock, so work on different sessions never serializes.
/// Lock order is registry, then session. Nothing takes the registry lock
/// while holding a session lock.
///
/// Callers never receive a reference into the store: reads return an owned
/// snapshot and writes run inside [`update`](Self::update).
pub struct SessionStore {
    config: StoreConfig,
    sessions: Mutex<LruCache<SessionId, Entry>>,
    events: SubscriptionManager,
}

impl SessionStore {
    /// Create an empty store.
    ///
    /// The cache itself is unbounded; `max_sessions` is enforced on insert so
    /// that sessions with a request in flight are never chosen for eviction.
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            sessions: Mutex::new(LruCache::unbounded()),
            events: SubscriptionManager::new(),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    // --- Session Lifecycle ---

    /// Start a new session at `Intake`. Without an id a fresh random one is
    /// generated. An existing session with the same id is replaced.
    pub fn create(&self, id: Option<&str>) -> Result<Session> {
        let id = match id {
            Some(id) => SessionId::new(id)?,
            None => SessionId::generate(),
        };

        let session = Session::new(id.clone());
        let snapshot = session.clone();
        let mut sessions = self.sessions.lock();
        self.insert_locked(&mut sessions, id, Entry::new(session));
        Ok(snapshot)
    }

    /// Snapshot of an existing session. Never creates.
    pub fn get(&self, id: &str) -> Option<Session> {
        let id = SessionId::new(id).ok()?;
        let entry = self.lookup(&id)?;
        let snapshot = entry.session.lock().clone();
        Some(snapshot)
    }

    /// Snapshot of the session with this id, creating it on first reference.
    ///
    /// Creation happens under the registry lock, so concurrent first access
    /// initializes the session exactly once.
    pub fn get_or_create(&self, id: &str) -> Result<Session> {
        let id = SessionId::new(id)?;
        let entry = self.resolve(&id);
        let snapshot = entry.session.lock().clone();
        Ok(snapshot)
    }

    /// Whether a live session exists. Does not affect recency.
    pub fn contains(&self, id: &str) -> bool {
        let Ok(id) = SessionId::new(id) else {
            return false;
        };
        let ttl = self.config.session_ttl();
        let sessions = self.sessions.lock();
        sessions
            .peek(&id)
            .map(|entry| !entry.is_evictable(ttl, Timestamp::now()))
            .unwrap_or(false)
    }

    // --- Mutation ---

    /// Run `f` with exclusive access to an existing session.
    ///
    /// Everything `f` does is applied as one unit: concurrent calls for the
    /// same id run one after another.
    pub fn update<R>(&self, id: &str, f: impl FnOnce(&mut Session) -> R) -> Result<R> {
        let id = SessionId::new(id)?;
        let entry = self
            .lookup(&id)
            .ok_or_else(|| OrchestratorError::SessionNotFound(id.clone()))?;
        Ok(self.apply(&entry, f))
    }

    /// Like [`update`](Self::update), creating the session on first reference.
    pub fn update_or_create<R>(&self, id: &str, f: impl FnOnce(&mut Session) -> R) -> Result<R> {
        let id = SessionId::new(id)?;
        let entry = self.resolve(&id);
        Ok(self.apply(&entry, f))
    }

    /// Run `f` against a session without mutating it.
    pub fn read<R>(&self, id: &str, f: impl FnOnce(&Session) -> R) -> Result<R> {
        let id = SessionId::new(id)?;
        let entry = self
            .lookup(&id)
            .ok_or(OrchestratorError::SessionNotFound(id))?;
        let session = entry.session.lock();
        Ok(f(&session))
    }

    fn apply<R>(&self, entry: &Entry, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut session = entry.session.lock();
        let history_len = session.history().len();

        let result = f(&mut session);

        // Published under the session lock so feed order equals history order.
        for key in session.take_written_keys() {
            self.events.publish(WorkflowEvent::DataUpdated {
                session_id: session.id().clone(),
                key,
            });
        }
        for record in &session.history()[history_len..] {
            self.events.publish(WorkflowEvent::Transition {
                session_id: session.id().clone(),
                record: record.clone(),
            });
        }

        entry.touch(Timestamp::now());
        result
    }

    // --- Eviction ---

    /// Remove every session idle longer than the configured TTL. Sessions with
    /// a request in flight are kept.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Timestamp::now())
    }

    /// Remove every session that is expired as of `now`.
    pub fn purge_expired_at(&self, now: Timestamp) -> usize {
        let ttl = self.config.session_ttl();
        if ttl.is_none() {
            return 0;
        }

        let mut sessions = self.sessions.lock();
        let expired: Vec<SessionId> = sessions
            .iter()
            .filter(|(_, entry)| entry.is_evictable(ttl, now))
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            sessions.pop(id);
            self.evicted(id.clone(), EvictionReason::Expired);
        }
        expired.len()
    }

    // --- Introspection ---

    /// Number of sessions held, expired-but-unpurged ones included.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of all held sessions, most recently used first.
    pub fn session_ids(&self) -> Vec<SessionId> {
        self.sessions
            .lock()
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    // --- Events ---

    /// Subscribe to workflow events. A zero buffer size takes the store's
    /// default.
    pub fn subscribe(&self, mut config: SubscriptionConfig) -> SubscriptionHandle {
        if config.buffer_size == 0 {
            config.buffer_size = self.config.event_buffer_size;
        }
        self.events.subscribe(config)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.events.unsubscribe(id);
    }

    pub fn subscription_count(&self) -> usize {
        self.events.subscription_count()
    }

    // --- Internals ---

    /// Find a live entry, dropping it if it has expired. A found entry counts
    /// as accessed.
    fn lookup(&self, id: &SessionId) -> Option<Entry> {
        let mut sessions = self.sessions.lock();
        self.lookup_locked(&mut sessions, id)
    }

    /// Find a live entry or insert a fresh session.
    fn resolve(&self, id: &SessionId) -> Entry {
        let mut sessions = self.sessions.lock();
        if let Some(entry) = self.lookup_locked(&mut sessions, id) {
            return entry;
        }

        let entry = Entry::new(Session::new(id.clone()));
        self.insert_locked(&mut sessions, id.clone(), entry.clone());
        entry
    }

    fn lookup_locked(
        &self,
        sessions: &mut LruCache<SessionId, Entry>,
        id: &SessionId,
    ) -> Option<Entry> {
        let ttl = self.config.session_ttl();
        let now = Timestamp::now();
        if sessions.get(id)?.is_evictable(ttl, now) {
            sessions.pop(id);
            self.evicted(id.clone(), EvictionReason::Expired);
            return None;
        }

        // Stamped under the registry lock, before the caller takes the
        // session lock.
        let entry = sessions.peek(id)?;
        entry.touch(now);
        Some(entry.clone())
    }

    fn insert_locked(
        &self,
        sessions: &mut LruCache<SessionId, Entry>,
        id: SessionId,
        entry: Entry,
    ) {
        let at = entry.last_access();
        tracing::info!(session_id = %id, "session created");

        if !sessions.contains(&id) {
            self.make_room(sessions);
        }
        sessions.put(id.clone(), entry);

        self.events.publish(WorkflowEvent::SessionCreated { session_id: id, at });
    }

    /// Evict least recently used idle sessions until one more fits. If every
    /// session is busy the registry runs over capacity until a later insert.
    fn make_room(&self, sessions: &mut LruCache<SessionId, Entry>) {
        let Some(capacity) = self.config.max_sessions.filter(|cap| *cap > 0) else {
            return;
        };

        while sessions.len() >= capacity {
            let victim = sessions
                .iter()
                .rev()
                .find(|(_, entry)| !entry.in_use())
                .map(|(id, _)| id.clone());

            let Some(victim) = victim else {
                tracing::warn!(
                    sessions = sessions.len(),
                    capacity,
                    "all sessions busy, capacity exceeded"
                );
                return;
            };
            sessions.pop(&victim);
            self.evicted(victim, EvictionReason::Capacity);
        }
    }

    fn evicted(&self, id: SessionId, reason: EvictionReason) {
        tracing::info!(session_id = %id, ?reason, "session evicted");
        self.events
            .publish(WorkflowEvent::SessionEvicted { session_id: id, reason });
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(StoreConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::WorkflowState;
    use crate::subscriptions::SubscriptionFilter;
    use crate::types::DataKey;
    use serde_json::json;

    fn bounded_store(max: usize) -> SessionStore {
        SessionStore::new(StoreConfig {
            max_sessions: Some(max),
            ..Default::default()
        })
    }

    #[test]
    fn test_create_without_id_generates_one() {
        let store = SessionStore::default();
        let a = store.create(None).unwrap();
        let b = store.create(None).unwrap();

        assert_ne!(a.id(), b.id());
        assert_eq!(a.current_state(), WorkflowState::Intake);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_create_rejects_blank_id() {
        let store = SessionStore::default();
        assert!(matches!(
            store.create(Some("")),
            Err(OrchestratorError::InvalidSessionId(_))
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_get_does_not_create() {
        let store = SessionStore::default();
        assert!(store.get("missing").is_none());
        assert!(store.get("").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let store = SessionStore::default();
        store.get_or_create("s1").unwrap();
        store
            .update("s1", |s| {
                s.set(DataKey::UserInput, json!("hello"));
                s.attempt_transition(WorkflowState::SchemeDiscovery, "moved")
            })
            .unwrap();

        let again = store.get_or_create("s1").unwrap();
        assert_eq!(again.current_state(), WorkflowState::SchemeDiscovery);
        assert_eq!(again.history().len(), 2);
        assert_eq!(again.get(DataKey::UserInput), Some(&json!("hello")));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_create_replaces_existing() {
        let store = SessionStore::default();
        store
            .update_or_create("s1", |s| {
                s.attempt_transition(WorkflowState::SchemeDiscovery, "moved")
            })
            .unwrap();

        let fresh = store.create(Some("s1")).unwrap();
        assert_eq!(fresh.current_state(), WorkflowState::Intake);
        assert_eq!(store.get("s1").unwrap().history().len(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_update_missing_session() {
        let store = SessionStore::default();
        let result = store.update("ghost", |_| ());
        assert!(matches!(result, Err(OrchestratorError::SessionNotFound(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn test_snapshots_are_detached() {
        let store = SessionStore::default();
        let mut snapshot = store.get_or_create("s1").unwrap();
        snapshot.set(DataKey::Intent, json!("farming"));

        assert!(store.get("s1").unwrap().get(DataKey::Intent).is_none());
    }

    #[test]
    fn test_capacity_evicts_least_recently_used() {
        let store = bounded_store(2);
        store.get_or_create("a").unwrap();
        store.get_or_create("b").unwrap();
        // Touch "a" so "b" becomes least recently used.
        store.get("a").unwrap();
        store.get_or_create("c").unwrap();

        assert!(store.contains("a"));
        assert!(!store.contains("b"));
        assert!(store.contains("c"));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_purge_expired_at() {
        let store = SessionStore::new(StoreConfig {
            session_ttl_secs: Some(60),
            ..Default::default()
        });
        store.get_or_create("a").unwrap();
        store.get_or_create("b").unwrap();

        assert_eq!(store.purge_expired_at(Timestamp::now()), 0);
        let later = Timestamp::now().plus(Duration::from_secs(120));
        assert_eq!(store.purge_expired_at(later), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn test_purge_without_ttl_is_noop() {
        let store = SessionStore::default();
        store.get_or_create("a").unwrap();
        let far_future = Timestamp::now().plus(Duration::from_secs(10 * 365 * 24 * 3600));
        assert_eq!(store.purge_expired_at(far_future), 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_update_publishes_events_in_order() {
        let store = SessionStore::default();
        let handle = store.subscribe(SubscriptionConfig {
            buffer_size: 0,
            filter: SubscriptionFilter::all(),
        });

        store
            .update_or_create("s1", |s| {
                s.set(DataKey::UserInput, json!("I am a farmer"));
                s.attempt_transition(WorkflowState::SchemeDiscovery, "input received");
            })
            .unwrap();

        let events = handle.drain();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], WorkflowEvent::SessionCreated { .. }));
        assert!(matches!(
            events[1],
            WorkflowEvent::DataUpdated {
                key: DataKey::UserInput,
                ..
            }
        ));
        match &events[2] {
            WorkflowEvent::Transition { record, .. } => {
                assert_eq!(record.to, WorkflowState::SchemeDiscovery)
            }
            other => panic!("Expected Transition event, got {:?}", other),
        }
    }

    #[test]
    fn test_capacity_eviction_is_published() {
        let store = bounded_store(1);
        let handle = store.subscribe(SubscriptionConfig {
            buffer_size: 16,
            filter: SubscriptionFilter::lifecycle(),
        });

        store.get_or_create("a").unwrap();
        store.get_or_create("b").unwrap();

        let evicted: Vec<_> = handle
            .drain()
            .into_iter()
            .filter_map(|e| match e {
                WorkflowEvent::SessionEvicted { session_id, reason } => Some((session_id, reason)),
                _ => None,
            })
            .collect();
        assert_eq!(
            evicted,
            vec![(SessionId::new("a").unwrap(), EvictionReason::Capacity)]
        );
    }

    #[test]
    fn test_in_flight_session_is_never_evicted() {
        let store = SessionStore::new(StoreConfig {
            max_sessions: Some(1),
            session_ttl_secs: Some(60),
            ..Default::default()
        });
        store.get_or_create("a").unwrap();
        let held = store.lookup(&SessionId::new("a").unwrap()).unwrap();

        let later = Timestamp::now().plus(Duration::from_secs(120));
        assert_eq!(store.purge_expired_at(later), 0);

        // No idle session to make room with: the bound is exceeded instead.
        store.get_or_create("b").unwrap();
        assert!(store.contains("a"));
        assert_eq!(store.len(), 2);

        drop(held);
        assert_eq!(store.purge_expired_at(later), 2);
        assert!(store.is_empty());
    }

    #[test]
    fn test_capacity_skips_busy_sessions() {
        let store = bounded_store(2);
        store.get_or_create("a").unwrap();
        store.get_or_create("b").unwrap();
        let held = store.lookup(&SessionId::new("a").unwrap()).unwrap();
        // "a" is least recently used but busy, so "b" goes instead.
        store.get("b").unwrap();

        store.get_or_create("c").unwrap();
        assert!(store.contains("a"));
        assert!(!store.contains("b"));
        assert!(store.contains("c"));
        drop(held);
    }

    #[test]
    fn test_lookup_refreshes_last_access() {
        let store = SessionStore::new(StoreConfig {
            session_ttl_secs: Some(60),
            ..Default::default()
        });
        store.get_or_create("a").unwrap();
        let id = SessionId::new("a").unwrap();
        let before = store.lookup(&id).unwrap().last_access();

        std::thread::sleep(Duration::from_millis(2));
        store.get("a").unwrap();
        let after = store.lookup(&id).unwrap().last_access();
        assert!(after > before);
    }

    #[test]
    fn test_config_from_json_defaults() {
        let config: StoreConfig = serde_json::from_str(r#"{"max_sessions": 10}"#).unwrap();
        assert_eq!(config.max_sessions, Some(10));
        assert_eq!(config.session_ttl_secs, None);
        assert_eq!(config.event_buffer_size, 1000);
    }
}

//! Subscription system for live workflow events.
//!
//! The store publishes an event whenever a session is created, changes
//! state, has a data slot written, or is evicted. Subscribers receive them
//! over bounded channels; a subscriber that falls behind is dropped.
//!
//! Events for a single session are published while that session is locked,
//! so their order matches the session's history.
//!
//! # Example
//!
//! ```ignore
//! let handle = store.subscribe(SubscriptionConfig {
//!     filter: SubscriptionFilter::transitions(),
//!     ..Default::default()
//! });
//!
//! while let Ok(event) = handle.recv() {
//!     match event {
//!         WorkflowEvent::Transition { session_id, record } => audit(session_id, record),
//!         WorkflowEvent::Dropped { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

mod manager;
mod types;

pub use manager::SubscriptionManager;
pub use types::{
    DropReason, EvictionReason, SubscriptionConfig, SubscriptionFilter, SubscriptionHandle,
    SubscriptionId, WorkflowEvent,
};

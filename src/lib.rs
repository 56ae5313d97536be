//! # SevaSetu Workflow Orchestrator
//!
//! Guides a citizen through a government-benefit application: describing
//! their need, picking a scheme, checking eligibility, uploading and
//! validating documents, generating the form, and filing a grievance when
//! things go wrong.
//!
//! ## Core Concepts
//!
//! - **Workflow graph**: a static table of which state may follow which
//! - **Sessions**: one user's state, accumulated data and transition history
//! - **Session store**: an in-memory registry with per-session locking and
//!   optional LRU / time-to-live eviction
//! - **Steps**: named business events that write data and attempt a transition
//! - **Events**: a subscription feed of transitions for auditing
//!
//! Intent extraction, scheme search, eligibility rules, OCR and PDF
//! generation live outside this crate. Their results are stored as opaque
//! JSON values in the session's data slots.
//!
//! ## Example
//!
//! ```ignore
//! use sevasetu::{Orchestrator, OrchestratorConfig};
//! use serde_json::json;
//!
//! let orchestrator = Orchestrator::new(OrchestratorConfig::default());
//!
//! let result = orchestrator.process_step("s1", "intake", &json!({
//!     "text": "I am a farmer"
//! }))?;
//! assert_eq!(result.next_action.as_deref(), Some("scheme_discovery"));
//!
//! let status = orchestrator.get_status("s1")?;
//! ```

pub mod error;
pub mod graph;
pub mod orchestrator;
pub mod session;
pub mod steps;
pub mod store;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use error::{OrchestratorError, Result};
pub use graph::{allowed_next, describe, WorkflowState};
pub use orchestrator::{Orchestrator, OrchestratorConfig};
pub use session::{Session, StatusView, TransitionRecord, STATUS_HISTORY_WINDOW};
pub use steps::{ProcessorConfig, Step, StepError, StepProcessor, StepResult, StepStatus};
pub use store::{SessionStore, StoreConfig};
pub use subscriptions::{
    DropReason, EvictionReason, SubscriptionConfig, SubscriptionFilter, SubscriptionHandle,
    SubscriptionId, SubscriptionManager, WorkflowEvent,
};
pub use types::*;

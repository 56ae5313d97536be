//! Step processor: the workflow's single state-machine driver.

use crate::error::Result;
use crate::graph::WorkflowState;
use crate::session::Session;
use crate::store::SessionStore;
use crate::types::DataKey;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use super::types::{Step, StepResult};

/// Reason recorded when a grievance is requested again while one is open.
const REPEATED_GRIEVANCE_REASON: &str = "Grievance requested again";

/// Step processor configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Record a history entry when `generate_grievance` arrives while the
    /// session is already in `Grievance`. Off by default, which leaves
    /// history untouched.
    pub audit_repeated_grievance: bool,
}

/// Translates named steps into data writes and transition attempts against
/// sessions held in a [`SessionStore`].
pub struct StepProcessor {
    store: Arc<SessionStore>,
    config: ProcessorConfig,
}

impl StepProcessor {
    pub fn new(store: Arc<SessionStore>, config: ProcessorConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    /// Apply one step to a session, creating the session on first reference.
    ///
    /// Data merge and transition happen under the session's lock. A step the
    /// session is not ready for changes nothing and comes back as an error
    /// result carrying the unchanged state.
    pub fn process_step(
        &self,
        session_id: &str,
        step: &str,
        payload: &Value,
    ) -> Result<StepResult> {
        let step_name = step;
        self.store.update_or_create(session_id, |session| {
            match step_name.parse::<Step>() {
                Ok(step) => self.apply(session, step, payload),
                Err(_) => {
                    tracing::warn!(
                        session_id = %session.id(),
                        step = step_name,
                        "unknown step"
                    );
                    StepResult::unknown_step(session.current_state(), step_name)
                }
            }
        })
    }

    /// Force an existing session into `Error` after an external collaborator
    /// failed irrecoverably.
    pub fn fail_session(&self, session_id: &str, reason: &str) -> Result<StepResult> {
        self.store.update(session_id, |session| {
            let from = session.current_state();
            if session.attempt_transition(WorkflowState::Error, reason) {
                tracing::warn!(session_id = %session.id(), %from, reason, "session failed");
                StepResult::success(
                    WorkflowState::Error,
                    format!("{}: {}", WorkflowState::Error.describe(), reason),
                    "intake",
                )
            } else {
                log_rejection(session, WorkflowState::Error, "fail_session");
                StepResult::rejected(from, WorkflowState::Error, "mark the session as failed")
            }
        })
    }

    /// Send an existing session back to `Intake` to start a new application.
    pub fn restart_session(&self, session_id: &str, reason: &str) -> Result<StepResult> {
        self.store.update(session_id, |session| {
            let from = session.current_state();
            if session.attempt_transition(WorkflowState::Intake, reason) {
                tracing::debug!(session_id = %session.id(), %from, "session restarted");
                StepResult::success(
                    WorkflowState::Intake,
                    WorkflowState::Intake.describe(),
                    "intake",
                )
            } else {
                log_rejection(session, WorkflowState::Intake, "restart");
                StepResult::rejected(from, WorkflowState::Intake, "restart the application")
            }
        })
    }

    fn apply(&self, session: &mut Session, step: Step, payload: &Value) -> StepResult {
        let current = session.current_state();
        let target = step.target();

        if step == Step::GenerateGrievance && current == WorkflowState::Grievance {
            if self.config.audit_repeated_grievance {
                session.record_repeat(REPEATED_GRIEVANCE_REASON);
            }
            return StepResult::success(current, step.message(), step.next_action());
        }

        // Transition first: a rejected step writes no data.
        if session.try_transition(target, step.reason()).is_err() {
            log_rejection(session, target, step.as_str());
            return StepResult::rejected(current, target, &format!("process '{}'", step));
        }
        merge_payload(session, step, payload);

        tracing::debug!(
            session_id = %session.id(),
            %step,
            from = %current,
            to = %target,
            "step applied"
        );
        StepResult::success(session.current_state(), step.message(), step.next_action())
    }
}

fn log_rejection(session: &Session, target: WorkflowState, action: &str) {
    tracing::warn!(
        session_id = %session.id(),
        action,
        from = %session.current_state(),
        to = %target,
        "transition rejected"
    );
}

/// Write the payload fields a step consumes. Missing fields become empty
/// values; everything else in the payload is ignored.
fn merge_payload(session: &mut Session, step: Step, payload: &Value) {
    match step {
        Step::Intake => {
            session.set(DataKey::UserInput, field_or(payload, "text", empty_string));
        }
        Step::SchemeSelected => {
            session.set(
                DataKey::SelectedScheme,
                field_or(payload, "scheme_id", empty_string),
            );
            session.set(
                DataKey::UserProfile,
                field_or(payload, "user_profile", empty_object),
            );
        }
        Step::DocumentsUploaded => {
            session.set(
                DataKey::UploadedDocuments,
                field_or(payload, "document_ids", empty_array),
            );
        }
        Step::EligibilityPassed
        | Step::EligibilityFailed
        | Step::ValidationPassed
        | Step::ValidationFailed
        | Step::FormGenerated
        | Step::GenerateGrievance => {}
    }
}

fn field_or(payload: &Value, field: &str, default: fn() -> Value) -> Value {
    match payload.get(field) {
        Some(Value::Null) | None => default(),
        Some(value) => value.clone(),
    }
}

fn empty_string() -> Value {
    Value::String(String::new())
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

fn empty_array() -> Value {
    Value::Array(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::{StepError, StepStatus};
    use serde_json::json;

    fn processor(config: ProcessorConfig) -> StepProcessor {
        StepProcessor::new(Arc::new(SessionStore::default()), config)
    }

    fn drive(p: &StepProcessor, id: &str, steps: &[&str]) {
        for step in steps {
            let result = p.process_step(id, step, &json!({})).unwrap();
            assert!(result.is_success(), "{step} failed: {:?}", result);
        }
    }

    #[test]
    fn test_intake_merges_text() {
        let p = processor(ProcessorConfig::default());
        let result = p
            .process_step("s1", "intake", &json!({"text": "I am a farmer", "extra": 1}))
            .unwrap();

        assert_eq!(result.status, StepStatus::Success);
        assert_eq!(result.current_state, WorkflowState::SchemeDiscovery);
        assert_eq!(result.next_action.as_deref(), Some("scheme_discovery"));

        let session = p.store().get("s1").unwrap();
        assert_eq!(session.get(DataKey::UserInput), Some(&json!("I am a farmer")));
        assert_eq!(session.data().len(), 1);
    }

    #[test]
    fn test_missing_payload_fields_default_to_empty() {
        let p = processor(ProcessorConfig::default());
        drive(&p, "s1", &["intake", "scheme_selected"]);
        p.process_step("s1", "eligibility_passed", &Value::Null).unwrap();
        p.process_step("s1", "documents_uploaded", &Value::Null).unwrap();

        let session = p.store().get("s1").unwrap();
        assert_eq!(session.get(DataKey::UserInput), Some(&json!("")));
        assert_eq!(session.get(DataKey::SelectedScheme), Some(&json!("")));
        assert_eq!(session.get(DataKey::UserProfile), Some(&json!({})));
        assert_eq!(session.get(DataKey::UploadedDocuments), Some(&json!([])));
        assert_eq!(session.current_state(), WorkflowState::DocumentValidation);
    }

    #[test]
    fn test_rejected_step_changes_nothing() {
        let p = processor(ProcessorConfig::default());
        drive(&p, "s1", &["intake"]);
        let before = p.store().get("s1").unwrap();

        let result = p
            .process_step("s1", "documents_uploaded", &json!({"document_ids": ["d1"]}))
            .unwrap();

        assert_eq!(result.status, StepStatus::Error);
        assert_eq!(result.current_state, WorkflowState::SchemeDiscovery);
        assert_eq!(
            result.error,
            Some(StepError::TransitionRejected {
                from: WorkflowState::SchemeDiscovery,
                to: WorkflowState::DocumentValidation,
            })
        );

        let after = p.store().get("s1").unwrap();
        assert_eq!(after.history(), before.history());
        assert!(after.get(DataKey::UploadedDocuments).is_none());
    }

    #[test]
    fn test_rejected_step_publishes_no_data_event() {
        use crate::subscriptions::{SubscriptionConfig, SubscriptionFilter, WorkflowEvent};

        let p = processor(ProcessorConfig::default());
        drive(&p, "s1", &["intake"]);
        let handle = p.store().subscribe(SubscriptionConfig {
            buffer_size: 16,
            filter: SubscriptionFilter::all(),
        });

        p.process_step("s1", "intake", &json!({"text": "again"})).unwrap();
        assert!(handle.drain().is_empty());

        p.process_step("s1", "scheme_selected", &json!({"scheme_id": "PM-KISAN"}))
            .unwrap();
        let events = handle.drain();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], WorkflowEvent::DataUpdated { .. }));
        assert!(matches!(events[1], WorkflowEvent::DataUpdated { .. }));
        assert!(matches!(events[2], WorkflowEvent::Transition { .. }));
    }

    #[test]
    fn test_validation_failed_loops_back_to_upload() {
        let p = processor(ProcessorConfig::default());
        drive(
            &p,
            "s1",
            &[
                "intake",
                "scheme_selected",
                "eligibility_passed",
                "documents_uploaded",
                "validation_failed",
            ],
        );
        let session = p.store().get("s1").unwrap();
        assert_eq!(session.current_state(), WorkflowState::DocumentUpload);

        drive(&p, "s1", &["documents_uploaded", "validation_passed", "form_generated"]);
        assert_eq!(
            p.store().get("s1").unwrap().current_state(),
            WorkflowState::Complete
        );
    }

    #[test]
    fn test_repeated_grievance_silent_by_default() {
        let p = processor(ProcessorConfig::default());
        drive(&p, "s1", &["intake", "scheme_selected", "eligibility_failed"]);
        let len = p.store().get("s1").unwrap().history().len();

        let result = p.process_step("s1", "generate_grievance", &json!({})).unwrap();
        assert!(result.is_success());
        assert_eq!(result.next_action.as_deref(), Some("grievance"));
        assert_eq!(p.store().get("s1").unwrap().history().len(), len);
    }

    #[test]
    fn test_repeated_grievance_audited_when_configured() {
        let p = processor(ProcessorConfig {
            audit_repeated_grievance: true,
        });
        drive(&p, "s1", &["intake", "scheme_selected", "eligibility_failed"]);
        let len = p.store().get("s1").unwrap().history().len();

        let result = p.process_step("s1", "generate_grievance", &json!({})).unwrap();
        assert!(result.is_success());

        let session = p.store().get("s1").unwrap();
        assert_eq!(session.history().len(), len + 1);
        let last = session.history().last().unwrap();
        assert_eq!(last.from, Some(WorkflowState::Grievance));
        assert_eq!(last.to, WorkflowState::Grievance);
        assert_eq!(session.current_state(), WorkflowState::Grievance);
    }

    #[test]
    fn test_grievance_from_complete() {
        let p = processor(ProcessorConfig::default());
        drive(
            &p,
            "s1",
            &[
                "intake",
                "scheme_selected",
                "eligibility_passed",
                "documents_uploaded",
                "validation_passed",
                "form_generated",
                "generate_grievance",
            ],
        );
        assert_eq!(
            p.store().get("s1").unwrap().current_state(),
            WorkflowState::Grievance
        );
    }

    #[test]
    fn test_fail_and_restart() {
        let p = processor(ProcessorConfig::default());
        drive(&p, "s1", &["intake", "scheme_selected"]);

        let failed = p.fail_session("s1", "OCR service unavailable").unwrap();
        assert!(failed.is_success());
        assert_eq!(failed.current_state, WorkflowState::Error);

        // Error only leads back to Intake.
        let again = p.fail_session("s1", "still down").unwrap();
        assert_eq!(again.status, StepStatus::Error);
        assert_eq!(again.current_state, WorkflowState::Error);

        let restarted = p.restart_session("s1", "user retried").unwrap();
        assert!(restarted.is_success());
        assert_eq!(restarted.current_state, WorkflowState::Intake);
        assert_eq!(restarted.next_action.as_deref(), Some("intake"));
    }

    #[test]
    fn test_restart_rejected_mid_flow() {
        let p = processor(ProcessorConfig::default());
        drive(&p, "s1", &["intake", "scheme_selected", "eligibility_passed"]);

        let result = p.restart_session("s1", "start over").unwrap();
        assert_eq!(result.status, StepStatus::Error);
        assert_eq!(result.current_state, WorkflowState::DocumentUpload);
    }

    #[test]
    fn test_fail_unknown_session() {
        let p = processor(ProcessorConfig::default());
        assert!(p.fail_session("ghost", "boom").is_err());
        assert!(p.store().is_empty());
    }
}

//! Step names, step results and the step table.

use crate::error::{OrchestratorError, Result};
use crate::graph::WorkflowState;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A named business event submitted by the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Intake,
    SchemeSelected,
    EligibilityPassed,
    EligibilityFailed,
    DocumentsUploaded,
    ValidationPassed,
    ValidationFailed,
    FormGenerated,
    GenerateGrievance,
}

impl Step {
    pub const ALL: [Step; 9] = [
        Step::Intake,
        Step::SchemeSelected,
        Step::EligibilityPassed,
        Step::EligibilityFailed,
        Step::DocumentsUploaded,
        Step::ValidationPassed,
        Step::ValidationFailed,
        Step::FormGenerated,
        Step::GenerateGrievance,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Step::Intake => "intake",
            Step::SchemeSelected => "scheme_selected",
            Step::EligibilityPassed => "eligibility_passed",
            Step::EligibilityFailed => "eligibility_failed",
            Step::DocumentsUploaded => "documents_uploaded",
            Step::ValidationPassed => "validation_passed",
            Step::ValidationFailed => "validation_failed",
            Step::FormGenerated => "form_generated",
            Step::GenerateGrievance => "generate_grievance",
        }
    }

    /// State the step tries to move the session to.
    pub fn target(self) -> WorkflowState {
        match self {
            Step::Intake => WorkflowState::SchemeDiscovery,
            Step::SchemeSelected => WorkflowState::EligibilityCheck,
            Step::EligibilityPassed => WorkflowState::DocumentUpload,
            Step::EligibilityFailed => WorkflowState::Grievance,
            Step::DocumentsUploaded => WorkflowState::DocumentValidation,
            Step::ValidationPassed => WorkflowState::FormGeneration,
            Step::ValidationFailed => WorkflowState::DocumentUpload,
            Step::FormGenerated => WorkflowState::Complete,
            Step::GenerateGrievance => WorkflowState::Grievance,
        }
    }

    /// Client action suggested after the step succeeds.
    pub fn next_action(self) -> &'static str {
        match self {
            Step::Intake => "scheme_discovery",
            Step::SchemeSelected => "eligibility_check",
            Step::EligibilityPassed => "document_upload",
            Step::EligibilityFailed => "grievance_or_alternatives",
            Step::DocumentsUploaded => "document_validation",
            Step::ValidationPassed => "form_generation",
            Step::ValidationFailed => "document_upload",
            Step::FormGenerated => "complete",
            Step::GenerateGrievance => "grievance",
        }
    }

    /// Message returned to the citizen on success.
    pub fn message(self) -> &'static str {
        match self {
            Step::Intake => "Input received. Finding matching schemes...",
            Step::SchemeSelected => "Checking eligibility...",
            Step::EligibilityPassed => "You're eligible! Please upload your documents.",
            Step::EligibilityFailed => {
                "You may not be eligible. We can help you file a grievance or find alternatives."
            }
            Step::DocumentsUploaded => "Validating your documents...",
            Step::ValidationPassed => "Documents validated! Generating your application form...",
            Step::ValidationFailed => "Document issues found. Please correct and re-upload.",
            Step::FormGenerated => "Your application form is ready for download!",
            Step::GenerateGrievance => "Generating grievance letter...",
        }
    }

    /// Reason written into the transition record.
    pub fn reason(self) -> &'static str {
        match self {
            Step::Intake => "User input received, moving to scheme discovery",
            Step::SchemeSelected => "Scheme selected, checking eligibility",
            Step::EligibilityPassed => "Eligible, requesting documents",
            Step::EligibilityFailed => "Not eligible, offering grievance option",
            Step::DocumentsUploaded => "Documents uploaded, validating",
            Step::ValidationPassed => "Validation passed, generating form",
            Step::ValidationFailed => "Validation issues, reupload requested",
            Step::FormGenerated => "Form generated successfully",
            Step::GenerateGrievance => "Grievance requested",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Step {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self> {
        Step::ALL
            .iter()
            .copied()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| OrchestratorError::UnknownStep(s.to_string()))
    }
}

/// Outcome flag of a step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Error,
}

/// Machine-readable reason a step failed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepError {
    /// The step name is not in the step table.
    UnknownStep { step: String },
    /// The session is out of sequence for this step.
    TransitionRejected {
        from: WorkflowState,
        to: WorkflowState,
    },
}

impl From<StepError> for OrchestratorError {
    fn from(e: StepError) -> Self {
        match e {
            StepError::UnknownStep { step } => OrchestratorError::UnknownStep(step),
            StepError::TransitionRejected { from, to } => {
                OrchestratorError::TransitionRejected { from, to }
            }
        }
    }
}

/// Caller-facing result of a step.
///
/// `current_state` is always the session's actual state after the step,
/// whether or not the step succeeded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub status: StepStatus,
    pub current_state: WorkflowState,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
}

impl StepResult {
    pub fn success(
        current_state: WorkflowState,
        message: impl Into<String>,
        next_action: impl Into<String>,
    ) -> Self {
        Self {
            status: StepStatus::Success,
            current_state,
            message: message.into(),
            next_action: Some(next_action.into()),
            error: None,
        }
    }

    pub fn failure(
        current_state: WorkflowState,
        message: impl Into<String>,
        error: StepError,
    ) -> Self {
        Self {
            status: StepStatus::Error,
            current_state,
            message: message.into(),
            next_action: None,
            error: Some(error),
        }
    }

    pub(crate) fn unknown_step(current_state: WorkflowState, step: &str) -> Self {
        Self::failure(
            current_state,
            format!("Unknown step: {}", step),
            StepError::UnknownStep {
                step: step.to_string(),
            },
        )
    }

    pub(crate) fn rejected(
        current_state: WorkflowState,
        target: WorkflowState,
        action: &str,
    ) -> Self {
        Self::failure(
            current_state,
            format!(
                "Cannot {} while the application is at '{}' ({})",
                action,
                current_state,
                current_state.describe()
            ),
            StepError::TransitionRejected {
                from: current_state,
                to: target,
            },
        )
    }

    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Success
    }

    /// Convert a failed result into the matching [`OrchestratorError`].
    pub fn into_result(self) -> Result<StepResult> {
        match self.error {
            Some(error) => Err(error.into()),
            None => Ok(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_names_parse() {
        for step in Step::ALL {
            assert_eq!(step.as_str().parse::<Step>().unwrap(), step);
        }
        assert_eq!(
            "frobnicate".parse::<Step>(),
            Err(OrchestratorError::UnknownStep("frobnicate".into()))
        );
    }

    #[test]
    fn test_every_target_is_reachable_from_somewhere() {
        for step in Step::ALL {
            let target = step.target();
            assert!(
                WorkflowState::ALL
                    .iter()
                    .any(|s| s.can_transition_to(target)),
                "{step} targets unreachable state {target}"
            );
        }
    }

    #[test]
    fn test_success_wire_shape() {
        let result = StepResult::success(WorkflowState::SchemeDiscovery, "ok", "scheme_discovery");
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(
            value,
            json!({
                "status": "success",
                "current_state": "scheme_discovery",
                "message": "ok",
                "next_action": "scheme_discovery",
            })
        );
    }

    #[test]
    fn test_rejected_wire_shape() {
        let result = StepResult::rejected(
            WorkflowState::Intake,
            WorkflowState::FormGeneration,
            "process 'validation_passed'",
        );
        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["current_state"], "intake");
        assert_eq!(value["error"]["kind"], "transition_rejected");
        assert_eq!(value["error"]["to"], "form_generation");
        assert!(value.get("next_action").is_none());
    }

    #[test]
    fn test_into_result() {
        let ok = StepResult::success(WorkflowState::Complete, "done", "complete");
        assert!(ok.into_result().is_ok());

        let err = StepResult::unknown_step(WorkflowState::Intake, "frobnicate");
        assert_eq!(
            err.into_result(),
            Err(OrchestratorError::UnknownStep("frobnicate".into()))
        );
    }
}

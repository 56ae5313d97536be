//! Static workflow graph: states, permitted transitions and descriptions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A step of the application workflow.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    #[default]
    Intake,
    SchemeDiscovery,
    EligibilityCheck,
    DocumentUpload,
    DocumentValidation,
    FormGeneration,
    Complete,
    Grievance,
    Error,
}

impl WorkflowState {
    /// Every state, in workflow order.
    pub const ALL: [WorkflowState; 9] = [
        WorkflowState::Intake,
        WorkflowState::SchemeDiscovery,
        WorkflowState::EligibilityCheck,
        WorkflowState::DocumentUpload,
        WorkflowState::DocumentValidation,
        WorkflowState::FormGeneration,
        WorkflowState::Complete,
        WorkflowState::Grievance,
        WorkflowState::Error,
    ];

    /// Wire name of the state.
    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowState::Intake => "intake",
            WorkflowState::SchemeDiscovery => "scheme_discovery",
            WorkflowState::EligibilityCheck => "eligibility_check",
            WorkflowState::DocumentUpload => "document_upload",
            WorkflowState::DocumentValidation => "document_validation",
            WorkflowState::FormGeneration => "form_generation",
            WorkflowState::Complete => "complete",
            WorkflowState::Grievance => "grievance",
            WorkflowState::Error => "error",
        }
    }

    /// States this one may move to, in preference order.
    pub fn allowed_next(self) -> &'static [WorkflowState] {
        use WorkflowState::*;
        match self {
            Intake => &[SchemeDiscovery, Error],
            SchemeDiscovery => &[EligibilityCheck, Intake, Error],
            EligibilityCheck => &[DocumentUpload, Grievance, SchemeDiscovery, Error],
            DocumentUpload => &[DocumentValidation, Error],
            DocumentValidation => &[FormGeneration, DocumentUpload, Error],
            FormGeneration => &[Complete, Error],
            Complete => &[Grievance, Intake],
            Grievance => &[Complete, Intake],
            Error => &[Intake],
        }
    }

    /// Whether `target` is a permitted next state.
    pub fn can_transition_to(self, target: WorkflowState) -> bool {
        self.allowed_next().contains(&target)
    }

    /// Human-readable description shown to the citizen.
    pub fn describe(self) -> &'static str {
        match self {
            WorkflowState::Intake => "Tell us about yourself and what you need",
            WorkflowState::SchemeDiscovery => "Finding matching government schemes",
            WorkflowState::EligibilityCheck => "Checking your eligibility",
            WorkflowState::DocumentUpload => "Upload your documents",
            WorkflowState::DocumentValidation => "Verifying your documents",
            WorkflowState::FormGeneration => "Generating your application form",
            WorkflowState::Complete => "Application ready!",
            WorkflowState::Grievance => "Generating grievance letter",
            WorkflowState::Error => "Something went wrong",
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Free-function form of [`WorkflowState::allowed_next`].
pub fn allowed_next(state: WorkflowState) -> &'static [WorkflowState] {
    state.allowed_next()
}

/// Free-function form of [`WorkflowState::describe`].
pub fn describe(state: WorkflowState) -> &'static str {
    state.describe()
}

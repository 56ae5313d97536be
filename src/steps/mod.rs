//! Named business steps and the processor that applies them.
//!
//! | step                 | data written                    | target             |
//! |----------------------|---------------------------------|--------------------|
//! | `intake`             | `user_input`                    | scheme_discovery   |
//! | `scheme_selected`    | `selected_scheme`, `user_profile` | eligibility_check |
//! | `eligibility_passed` |                                 | document_upload    |
//! | `eligibility_failed` |                                 | grievance          |
//! | `documents_uploaded` | `uploaded_documents`            | document_validation|
//! | `validation_passed`  |                                 | form_generation    |
//! | `validation_failed`  |                                 | document_upload    |
//! | `form_generated`     |                                 | complete           |
//! | `generate_grievance` |                                 | grievance          |
//!
//! Any other name is reported as an unknown step.

mod processor;
mod types;

pub use processor::{ProcessorConfig, StepProcessor};
pub use types::{Step, StepError, StepResult, StepStatus};

//! Core types for the workflow orchestrator.

use crate::error::{OrchestratorError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Opaque identifier for a session.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap a caller-supplied id. Blank ids are rejected.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(OrchestratorError::InvalidSessionId(id));
        }
        Ok(SessionId(id))
    }

    /// Fresh random id (UUID v4).
    pub fn generate() -> Self {
        SessionId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self> {
        SessionId::new(s)
    }
}

/// Microseconds since Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current time. A clock set before the epoch reads as zero.
    pub fn now() -> Self {
        let micros = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as i64)
            .unwrap_or(0);
        Timestamp(micros)
    }

    /// Time elapsed from `earlier` to `self`, zero if `earlier` is later.
    pub fn since(self, earlier: Timestamp) -> Duration {
        let micros = self.0.saturating_sub(earlier.0).max(0);
        Duration::from_micros(micros as u64)
    }

    /// This timestamp shifted forward by `by`.
    pub fn plus(self, by: Duration) -> Self {
        let micros = i64::try_from(by.as_micros()).unwrap_or(i64::MAX);
        Timestamp(self.0.saturating_add(micros))
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// The closed set of data slots a session accumulates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKey {
    UserInput,
    Intent,
    MatchedSchemes,
    SelectedScheme,
    UserProfile,
    EligibilityResult,
    UploadedDocuments,
    ExtractedData,
    ValidationResult,
    FormResult,
    GrievanceResult,
}

impl DataKey {
    /// Every slot, in display order.
    pub const ALL: [DataKey; 11] = [
        DataKey::UserInput,
        DataKey::Intent,
        DataKey::MatchedSchemes,
        DataKey::SelectedScheme,
        DataKey::UserProfile,
        DataKey::EligibilityResult,
        DataKey::UploadedDocuments,
        DataKey::ExtractedData,
        DataKey::ValidationResult,
        DataKey::FormResult,
        DataKey::GrievanceResult,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DataKey::UserInput => "user_input",
            DataKey::Intent => "intent",
            DataKey::MatchedSchemes => "matched_schemes",
            DataKey::SelectedScheme => "selected_scheme",
            DataKey::UserProfile => "user_profile",
            DataKey::EligibilityResult => "eligibility_result",
            DataKey::UploadedDocuments => "uploaded_documents",
            DataKey::ExtractedData => "extracted_data",
            DataKey::ValidationResult => "validation_result",
            DataKey::FormResult => "form_result",
            DataKey::GrievanceResult => "grievance_result",
        }
    }
}

impl fmt::Display for DataKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataKey {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self> {
        DataKey::ALL
            .iter()
            .copied()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| OrchestratorError::UnknownDataKey(s.to_string()))
    }
}

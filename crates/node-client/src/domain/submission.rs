//! Atom submission progress.

use crate::domain::atom::AtomId;
use crate::domain::error::ClientError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Progress of one atom submission.
///
/// `Stored` and `Failed` are terminal; a submission reports exactly one of
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AtomSubmissionState {
    Submitting,
    Submitted,
    Stored,
    Failed,
}

impl AtomSubmissionState {
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Stored | Self::Failed)
    }

    /// Parse the wire name (`"STORED"`, ...).
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "SUBMITTING" => Some(Self::Submitting),
            "SUBMITTED" => Some(Self::Submitted),
            "STORED" => Some(Self::Stored),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for AtomSubmissionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Submitting => "SUBMITTING",
            Self::Submitted => "SUBMITTED",
            Self::Stored => "STORED",
            Self::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// One step of a submission stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AtomSubmissionUpdate {
    pub atom_id: AtomId,
    pub state: AtomSubmissionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: u64,
}

impl AtomSubmissionUpdate {
    pub fn new(
        atom_id: AtomId,
        state: AtomSubmissionState,
        message: Option<String>,
        timestamp_ms: u64,
    ) -> Self {
        Self {
            atom_id,
            state,
            message,
            timestamp_ms,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state.is_complete()
    }

    /// Build from the `params` of an `AtomSubmissionState.onNext`
    /// notification: `{"subscriberId", "value", "message"?}`.
    pub fn from_notification(
        atom_id: AtomId,
        params: &Value,
        timestamp_ms: u64,
    ) -> Result<Self, ClientError> {
        let value = params
            .get("value")
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::protocol("submission update has no value"))?;
        let state = AtomSubmissionState::from_wire(value).ok_or_else(|| {
            ClientError::protocol(format!("unknown submission state {}", value))
        })?;
        let message = params
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(Self::new(atom_id, state, message, timestamp_ms))
    }
}

//! The serialized failure carried in `Error` envelope bodies.

use serde::{Deserialize, Serialize};

use crate::error::MessageError;

/// Failure description exchanged between peers.
///
/// When one side catches a precondition failure while executing a command,
/// it serializes a `RemoteFailure` into the body of an `Error` envelope.
/// The side that receives a terminal `Error` recovers it and surfaces it as
/// a runtime failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFailure {
    /// Human-readable description of the failure.
    pub message: String,
    /// Optional machine-readable code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl RemoteFailure {
    /// Create a failure with a message and no code.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    /// Serialize into an envelope body.
    pub fn to_body(&self) -> String {
        // A struct of plain strings cannot fail to serialize.
        serde_json::to_string(self).expect("failure serialization")
    }

    /// Parse from an envelope body.
    pub fn from_body(body: &str) -> Result<Self, MessageError> {
        Ok(serde_json::from_str(body)?)
    }

    /// Parse from an envelope body, treating a body without the expected
    /// substructure as a bare failure message. A peer's error is never
    /// dropped just because its body is malformed.
    pub fn from_body_lossy(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_else(|_| Self::new(body))
    }
}

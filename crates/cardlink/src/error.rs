//! Error types for the services.

use cardlink_core::{MessageError, RemoteFailure};
use cardlink_node::NodeError;
use thiserror::Error;

use crate::api::ReaderApiError;

/// Errors surfaced by the client driver and the server dispatcher.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// A parameter check failed before any session was opened. No envelope
    /// was sent.
    #[error("invalid parameter: {0}")]
    Precondition(String),

    /// The service is wired incorrectly (missing or wrong-discipline node,
    /// missing event filter, zero timeout).
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The peer terminated the transaction with an `Error` envelope; the
    /// embedded failure is carried here, never swallowed.
    #[error("remote execution failed: {}", .0.message)]
    Remote(RemoteFailure),

    /// Transport or timeout failure from the node layer.
    #[error("node error: {0}")]
    Node(#[from] NodeError),

    /// Fatal (non-precondition) failure from the reader collaborator.
    #[error("reader error: {0}")]
    Reader(#[from] ReaderApiError),

    /// Envelope-level violation (api level, unknown action).
    #[error(transparent)]
    Message(#[from] MessageError),

    /// A protocol-owned body substructure did not decode.
    #[error("malformed message body: {0}")]
    MalformedBody(#[from] serde_json::Error),
}

impl ServiceError {
    /// Whether this failure is the async node's request timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ServiceError::Node(NodeError::Timeout { .. }))
    }
}

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, ServiceError>;

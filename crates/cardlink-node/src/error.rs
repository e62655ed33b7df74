//! Error types for the node layer.

use std::time::Duration;

use cardlink_core::SessionId;
use thiserror::Error;

/// Boxed error returned by message handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors that can occur during node operations.
#[derive(Debug, Error)]
pub enum NodeError {
    /// No correlated reply arrived within the configured timeout.
    ///
    /// This failure is never converted into a protocol envelope: there is
    /// no reply to carry it.
    #[error("no reply received within {timeout:?} for session {session_id}")]
    Timeout {
        session_id: SessionId,
        timeout: Duration,
    },

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(String),

    /// The transport returned without a reply correlated to the request.
    #[error("no correlated reply for session {0}")]
    NoReply(SessionId),

    /// A request is already awaiting its reply on this session. Within one
    /// session envelopes are strictly request-then-reply.
    #[error("a request is already pending for session {0}")]
    RequestPending(SessionId),

    /// No open exchange exists to carry a message for this session.
    #[error("no open transport exchange for session {0}")]
    SessionNotFound(SessionId),

    /// The operation is not part of this node's transport discipline.
    #[error("operation not supported by this node: {0}")]
    Unsupported(&'static str),

    /// No message handler is bound to the node.
    #[error("no message handler is bound")]
    Unbound,

    /// The bound message handler failed while processing an inbound
    /// envelope.
    #[error("message handler failed: {0}")]
    Handler(#[source] BoxError),
}

/// Result type for node operations.
pub type Result<T> = std::result::Result<T, NodeError>;

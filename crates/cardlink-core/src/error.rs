//! Error types for the wire primitives.

use thiserror::Error;

/// Errors raised while validating or decoding an envelope.
#[derive(Debug, Error)]
pub enum MessageError {
    /// The peer speaks a newer protocol level than this build.
    #[error("unsupported API level: local={local}, peer={peer}")]
    UnsupportedApiLevel { local: u8, peer: u8 },

    /// The peer sent an action this build does not know.
    #[error("unknown action in received message")]
    UnknownAction,

    /// A protocol-owned body substructure did not decode.
    #[error("malformed message body: {0}")]
    MalformedBody(#[from] serde_json::Error),
}

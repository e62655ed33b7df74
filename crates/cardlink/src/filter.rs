//! Client-side policy applied to observed reader events.

use serde_json::Value;

use crate::error::ServiceError;

/// A local reader event about to be forwarded to the remote peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderEvent {
    /// Name of the local reader the event originated from.
    pub reader_name: String,
    /// Opaque event payload as produced by the reader collaborator.
    pub body: String,
}

/// Outcome of the pre-broadcast consultation.
///
/// Cancellation is a first-class variant, not an error: suppressing one
/// event is a normal control decision.
#[derive(Debug, Clone, PartialEq)]
pub enum EventDecision {
    /// Forward the event, optionally attaching input data for the remote
    /// service.
    Forward(Option<Value>),
    /// Do not forward this event at all.
    Suppress,
}

/// Application policy consulted around each forwarded reader event.
///
/// Only used when reader observation was requested on
/// `execute_remote_service`.
pub trait ReaderEventFilter: Send + Sync {
    /// Invoked before the event is broadcast to the remote peer.
    fn before_broadcast(&self, event: &ReaderEvent) -> EventDecision;

    /// Invoked with the remote peer's output once the broadcast completed.
    fn after_broadcast(&self, output: Option<Value>);

    /// Invoked when the broadcast failed (transport, timeout, or a remote
    /// `Error`). Returning `true` stops local observation of the reader:
    /// this is the consumer-controlled circuit breaker.
    fn on_broadcast_error(&self, error: &ServiceError) -> bool;
}

//! Endpoint SPI consumed from the transport collaborator.
//!
//! A node never talks to the network itself: it drives one of these
//! endpoint traits, implemented by the application around whatever
//! transport it uses (HTTP round trips, websockets, message queues).
//! Implementations must be thread-safe (Send + Sync).

use async_trait::async_trait;

use cardlink_core::{Message, SessionId};

use crate::error::{BoxError, Result};

/// Client endpoint of a synchronous (request/reply) transport.
///
/// The transport call itself blocks and returns the next envelope(s)
/// directly; no separate receive path exists.
#[async_trait]
pub trait SyncClientEndpoint: Send + Sync {
    /// Send an envelope and return every envelope the peer handed back.
    ///
    /// The node collapses the returned list to the one reply correlated to
    /// the request; surplus envelopes are dispatched as unsolicited input.
    async fn send_request(&self, message: Message) -> Result<Vec<Message>>;
}

/// Client endpoint of an asynchronous (push/callback) transport.
///
/// Send and receive are decoupled: outbound envelopes go through
/// [`send_message`](AsyncClientEndpoint::send_message), inbound envelopes
/// come back through the owning node's `on_message` entry point.
#[async_trait]
pub trait AsyncClientEndpoint: Send + Sync {
    /// Open the transport-level session bracket.
    async fn open_session(&self, session_id: &SessionId) -> Result<()>;

    /// Push an envelope to the peer.
    async fn send_message(&self, message: Message) -> Result<()>;

    /// Close the transport-level session bracket.
    async fn close_session(&self, session_id: &SessionId) -> Result<()>;
}

/// Server endpoint of an asynchronous (push/callback) transport.
#[async_trait]
pub trait AsyncServerEndpoint: Send + Sync {
    /// Push an envelope to the peer identified by the envelope's
    /// correlation fields.
    async fn send_message(&self, message: Message) -> Result<()>;
}

/// Inbound delivery callback implemented by the local service owning a
/// node.
///
/// A node invokes this for every envelope that is not the correlated reply
/// of an outstanding request.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Process one inbound envelope.
    async fn on_message(&self, message: Message) -> std::result::Result<(), BoxError>;
}

/// Late-bound handler reference.
///
/// Services own their nodes, so the node only keeps a weak reference back,
/// installed once right after the service is constructed.
pub(crate) struct HandlerSlot(std::sync::OnceLock<std::sync::Weak<dyn MessageHandler>>);

impl HandlerSlot {
    pub(crate) fn new() -> Self {
        Self(std::sync::OnceLock::new())
    }

    pub(crate) fn bind(&self, handler: &std::sync::Arc<dyn MessageHandler>) {
        let _ = self.0.set(std::sync::Arc::downgrade(handler));
    }

    pub(crate) fn get(&self) -> Option<std::sync::Arc<dyn MessageHandler>> {
        self.0.get().and_then(std::sync::Weak::upgrade)
    }
}

//! The uniform node contract consumed by the transaction drivers.

use async_trait::async_trait;

use cardlink_core::{Message, NodeId, SessionId};

use crate::error::Result;

/// Transport binding of a local service.
///
/// One node is created per service at construction time and is immutable
/// thereafter; it owns no per-transaction state beyond what the drivers
/// pass it. The four implementations cover the two transport disciplines
/// (sync request/reply, async push/callback) in client and server flavors.
#[async_trait]
pub trait Node: Send + Sync {
    /// Identifier of this transport endpoint.
    fn node_id(&self) -> NodeId;

    /// Open the session bracket for a transaction.
    async fn open_session(&self, session_id: &SessionId) -> Result<()>;

    /// Close the session bracket.
    ///
    /// Closing is cleanup, not a protocol step: transport errors are
    /// logged and swallowed, never escalated.
    async fn close_session_silently(&self, session_id: &SessionId);

    /// Fire-and-forget send, used where no reply is expected.
    async fn send_message(&self, message: Message) -> Result<()>;

    /// Send an envelope and block until exactly one correlated reply is
    /// available.
    async fn send_request(&self, message: Message) -> Result<Message>;
}

//! Server-flavored nodes: one per transport discipline.
//!
//! Server nodes never await replies; they hand every inbound envelope to
//! the owning service and carry its responses (and event pushes) back out.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use cardlink_core::{Message, NodeId, SessionId};

use crate::endpoint::{AsyncServerEndpoint, HandlerSlot, MessageHandler};
use crate::error::{NodeError, Result};
use crate::node::Node;

/// Server node over a synchronous request/reply transport.
///
/// The transport delivers one request at a time through
/// [`on_request`](SyncServerNode::on_request) and expects the replies as
/// the return value. While the request is being dispatched, everything the
/// service sends for that session is collected into a per-session bucket;
/// the drained bucket is the transport's response payload.
///
/// Outside an open bucket there is no way to reach the peer: a
/// request/reply transport has no push channel. `send_message` then fails
/// with [`NodeError::SessionNotFound`], which is what lets event fan-out
/// self-evict subscribers attached through a sync transport.
pub struct SyncServerNode {
    node_id: NodeId,
    handler: HandlerSlot,
    buckets: Mutex<HashMap<SessionId, Vec<Message>>>,
}

impl SyncServerNode {
    /// Create a node.
    pub fn new() -> Self {
        Self {
            node_id: NodeId::random(),
            handler: HandlerSlot::new(),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Install the owning service's inbound callback.
    pub fn bind_handler(&self, handler: &Arc<dyn MessageHandler>) {
        self.handler.bind(handler);
    }

    /// Transport entry point: dispatch one inbound request and return the
    /// envelopes the service produced for it.
    pub async fn on_request(&self, message: Message) -> Result<Vec<Message>> {
        let session_id = message.session_id;
        self.buckets.lock().await.insert(session_id, Vec::new());

        let handler = match self.handler.get() {
            Some(handler) => handler,
            None => {
                self.buckets.lock().await.remove(&session_id);
                return Err(NodeError::Unbound);
            }
        };

        let outcome = handler.on_message(message).await;
        let replies = self
            .buckets
            .lock()
            .await
            .remove(&session_id)
            .unwrap_or_default();

        outcome.map_err(NodeError::Handler)?;
        Ok(replies)
    }
}

impl Default for SyncServerNode {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Node for SyncServerNode {
    fn node_id(&self) -> NodeId {
        self.node_id
    }

    async fn open_session(&self, _session_id: &SessionId) -> Result<()> {
        Ok(())
    }

    async fn close_session_silently(&self, _session_id: &SessionId) {}

    async fn send_message(&self, mut message: Message) -> Result<()> {
        message.server_node_id = Some(self.node_id);
        let mut buckets = self.buckets.lock().await;
        match buckets.get_mut(&message.session_id) {
            Some(bucket) => {
                bucket.push(message);
                Ok(())
            }
            None => Err(NodeError::SessionNotFound(message.session_id)),
        }
    }

    async fn send_request(&self, _message: Message) -> Result<Message> {
        Err(NodeError::Unsupported(
            "send_request on a sync server node",
        ))
    }
}

/// Server node over an asynchronous push/callback transport.
pub struct AsyncServerNode {
    node_id: NodeId,
    endpoint: Arc<dyn AsyncServerEndpoint>,
    handler: HandlerSlot,
}

impl AsyncServerNode {
    /// Create a node bound to the given endpoint.
    pub fn new(endpoint: Arc<dyn AsyncServerEndpoint>) -> Self {
        Self {
            node_id: NodeId::random(),
            endpoint,
            handler: HandlerSlot::new(),
        }
    }

    /// Install the owning service's inbound callback.
    pub fn bind_handler(&self, handler: &Arc<dyn MessageHandler>) {
        self.handler.bind(handler);
    }

    /// Inbound delivery entry point, invoked by the transport for every
    /// envelope pushed by a client.
    ///
    /// Dispatch failures other than the ones the service converts into
    /// `Error` replies itself are fatal to this dispatch and surface here.
    pub async fn on_message(&self, message: Message) -> Result<()> {
        let handler = self.handler.get().ok_or(NodeError::Unbound)?;
        handler.on_message(message).await.map_err(NodeError::Handler)
    }
}

#[async_trait]
impl Node for AsyncServerNode {
    fn node_id(&self) -> NodeId {
        self.node_id
    }

    async fn open_session(&self, _session_id: &SessionId) -> Result<()> {
        Ok(())
    }

    async fn close_session_silently(&self, _session_id: &SessionId) {}

    async fn send_message(&self, mut message: Message) -> Result<()> {
        message.server_node_id = Some(self.node_id);
        self.endpoint.send_message(message).await
    }

    async fn send_request(&self, _message: Message) -> Result<Message> {
        Err(NodeError::Unsupported(
            "send_request on an async server node",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use cardlink_core::Action;
    use std::sync::Mutex as StdMutex;

    /// Handler that answers every request with a RESP derived from it.
    struct EchoHandler {
        node: StdMutex<Option<Arc<SyncServerNode>>>,
    }

    #[async_trait]
    impl MessageHandler for EchoHandler {
        async fn on_message(&self, message: Message) -> std::result::Result<(), BoxError> {
            let node = self.node.lock().unwrap().clone().unwrap();
            let reply = message.reply(Action::Resp, "done");
            node.send_message(reply).await?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_sync_server_returns_handler_replies() {
        let node = Arc::new(SyncServerNode::new());
        let handler = Arc::new(EchoHandler {
            node: StdMutex::new(Some(node.clone())),
        });
        node.bind_handler(&(handler.clone() as Arc<dyn MessageHandler>));

        let request = Message::new(Action::ExecuteRemoteService, SessionId::random());
        let replies = node.on_request(request.clone()).await.unwrap();

        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].action, Action::Resp);
        assert_eq!(replies[0].session_id, request.session_id);
        assert_eq!(replies[0].server_node_id, Some(node.node_id()));
        // The bucket is gone afterwards.
        assert!(node.buckets.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_sync_server_send_without_bucket_fails() {
        let node = SyncServerNode::new();
        let push = Message::new(Action::ReaderEvent, SessionId::random());

        let err = node.send_message(push).await.unwrap_err();
        assert!(matches!(err, NodeError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn test_sync_server_unbound_is_an_error() {
        let node = SyncServerNode::new();
        let request = Message::new(Action::ExecuteRemoteService, SessionId::random());

        let err = node.on_request(request).await.unwrap_err();
        assert!(matches!(err, NodeError::Unbound));
    }

    struct CapturingEndpoint {
        sent: StdMutex<Vec<Message>>,
    }

    #[async_trait]
    impl AsyncServerEndpoint for CapturingEndpoint {
        async fn send_message(&self, message: Message) -> Result<()> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_async_server_stamps_server_node_id() {
        let endpoint = Arc::new(CapturingEndpoint {
            sent: StdMutex::new(Vec::new()),
        });
        let node = AsyncServerNode::new(endpoint.clone());

        let push = Message::new(Action::PluginEvent, SessionId::random());
        node.send_message(push).await.unwrap();

        let sent = endpoint.sent.lock().unwrap();
        assert_eq!(sent[0].server_node_id, Some(node.node_id()));
    }
}

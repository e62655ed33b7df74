//! Client-flavored nodes: one per transport discipline.
//!
//! Both stamp the node's identifier into every outbound envelope so the
//! server side can correlate and register the caller.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{oneshot, Mutex};

use cardlink_core::{Action, Message, NodeId, SessionId};

use crate::endpoint::{AsyncClientEndpoint, HandlerSlot, MessageHandler, SyncClientEndpoint};
use crate::error::{NodeError, Result};
use crate::node::Node;

/// Client node over a synchronous request/reply transport.
///
/// The transport call itself blocks and hands back the reply envelopes, so
/// no suspension machinery is needed. Session brackets are no-ops: a
/// request/reply transport has no session state of its own.
pub struct SyncClientNode {
    node_id: NodeId,
    endpoint: Arc<dyn SyncClientEndpoint>,
    handler: HandlerSlot,
}

impl SyncClientNode {
    /// Create a node bound to the given endpoint.
    pub fn new(endpoint: Arc<dyn SyncClientEndpoint>) -> Self {
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

    async fn dispatch_unsolicited(&self, messages: Vec<Message>) {
        for message in messages {
            dispatch_to_handler(&self.handler, message).await;
        }
    }
}

#[async_trait]
impl Node for SyncClientNode {
    fn node_id(&self) -> NodeId {
        self.node_id
    }

    async fn open_session(&self, _session_id: &SessionId) -> Result<()> {
        Ok(())
    }

    async fn close_session_silently(&self, _session_id: &SessionId) {}

    async fn send_message(&self, mut message: Message) -> Result<()> {
        message.client_node_id = Some(self.node_id);
        let replies = self.endpoint.send_request(message).await?;
        self.dispatch_unsolicited(replies).await;
        Ok(())
    }

    async fn send_request(&self, mut message: Message) -> Result<Message> {
        message.client_node_id = Some(self.node_id);
        let session_id = message.session_id;

        let replies = self.endpoint.send_request(message).await?;

        // Collapse the list to the next correlated reply; everything else
        // is unsolicited input for the owning service.
        let mut correlated = None;
        let mut unsolicited = Vec::new();
        for reply in replies {
            if correlated.is_none() && reply.session_id == session_id {
                correlated = Some(reply);
            } else {
                unsolicited.push(reply);
            }
        }
        self.dispatch_unsolicited(unsolicited).await;

        correlated.ok_or(NodeError::NoReply(session_id))
    }
}

/// Client node over an asynchronous push/callback transport.
///
/// This is the only place in the system that suspends: `send_request`
/// parks the calling task until the transport feeds the correlated reply
/// back through [`on_message`](AsyncClientNode::on_message), or the
/// configured timeout elapses.
pub struct AsyncClientNode {
    node_id: NodeId,
    endpoint: Arc<dyn AsyncClientEndpoint>,
    timeout: Duration,
    pending: Mutex<HashMap<SessionId, oneshot::Sender<Message>>>,
    handler: HandlerSlot,
}

impl AsyncClientNode {
    /// Create a node bound to the given endpoint. The timeout bounds every
    /// `send_request`.
    pub fn new(endpoint: Arc<dyn AsyncClientEndpoint>, timeout: Duration) -> Self {
        Self {
            node_id: NodeId::random(),
            endpoint,
            timeout,
            pending: Mutex::new(HashMap::new()),
            handler: HandlerSlot::new(),
        }
    }

    /// Install the owning service's inbound callback.
    pub fn bind_handler(&self, handler: &Arc<dyn MessageHandler>) {
        self.handler.bind(handler);
    }

    /// Inbound delivery entry point, invoked by the transport for every
    /// envelope pushed by the peer.
    ///
    /// A reply correlates to a parked request only if it is a reply-shaped
    /// action, carries this node's identifier, and a waiter exists for its
    /// session. Everything else is handed to the owning service. A reply
    /// racing an expired timeout is discarded, never matched to another
    /// session.
    pub async fn on_message(&self, message: Message) {
        let is_reply = matches!(
            message.action,
            Action::Resp | Action::Error | Action::EndRemoteService
        );
        if is_reply && message.client_node_id == Some(self.node_id) {
            let waiter = self.pending.lock().await.remove(&message.session_id);
            if let Some(tx) = waiter {
                if let Err(unclaimed) = tx.send(message) {
                    tracing::warn!(
                        session_id = %unclaimed.session_id,
                        "reply arrived after the request gave up; discarded"
                    );
                }
                return;
            }
        }
        dispatch_to_handler(&self.handler, message).await;
    }
}

#[async_trait]
impl Node for AsyncClientNode {
    fn node_id(&self) -> NodeId {
        self.node_id
    }

    async fn open_session(&self, session_id: &SessionId) -> Result<()> {
        self.endpoint.open_session(session_id).await
    }

    async fn close_session_silently(&self, session_id: &SessionId) {
        if let Err(e) = self.endpoint.close_session(session_id).await {
            tracing::warn!(session_id = %session_id, error = %e, "session close failed; ignored");
        }
        // Drop any waiter the transaction left behind.
        self.pending.lock().await.remove(session_id);
    }

    async fn send_message(&self, mut message: Message) -> Result<()> {
        message.client_node_id = Some(self.node_id);
        self.endpoint.send_message(message).await
    }

    async fn send_request(&self, mut message: Message) -> Result<Message> {
        message.client_node_id = Some(self.node_id);
        let session_id = message.session_id;

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.pending.lock().await;
            if pending.contains_key(&session_id) {
                return Err(NodeError::RequestPending(session_id));
            }
            pending.insert(session_id, tx);
        }

        if let Err(e) = self.endpoint.send_message(message).await {
            self.pending.lock().await.remove(&session_id);
            return Err(e);
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => {
                // Waiter dropped without a reply: the session was closed
                // underneath the request.
                Err(NodeError::NoReply(session_id))
            }
            Err(_) => {
                self.pending.lock().await.remove(&session_id);
                Err(NodeError::Timeout {
                    session_id,
                    timeout: self.timeout,
                })
            }
        }
    }
}

pub(crate) async fn dispatch_to_handler(slot: &HandlerSlot, message: Message) {
    match slot.get() {
        Some(handler) => {
            if let Err(e) = handler.on_message(message).await {
                tracing::warn!(error = %e, "handler failed on unsolicited message");
            }
        }
        None => {
            tracing::warn!(
                session_id = %message.session_id,
                action = ?message.action,
                "unsolicited message dropped: no handler bound"
            );
        }
    }
}

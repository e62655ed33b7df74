//! Scriptable transport endpoints.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use cardlink_core::{Action, Message, NodeId, SessionId};
use cardlink_node::{
    AsyncClientEndpoint, AsyncServerEndpoint, NodeError, Result, SyncClientEndpoint,
};

/// A fake remote controller that drives transactions.
///
/// For each session it replies with the scripted command bodies in order,
/// then terminates with `END_REMOTE_SERVICE` carrying the end body.
/// Progress is tracked per session, so interleaved transactions each see
/// their own command sequence.
pub struct ScriptedRemote {
    commands: Vec<String>,
    end_body: String,
    progress: Mutex<HashMap<SessionId, usize>>,
}

impl ScriptedRemote {
    /// Script a controller sending the given commands before terminating.
    pub fn new<I, S>(commands: I, end_body: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            commands: commands.into_iter().map(Into::into).collect(),
            end_body: end_body.into(),
            progress: Mutex::new(HashMap::new()),
        }
    }

    /// Derive the controller's next envelope for the given client request.
    pub fn next_reply(&self, request: &Message) -> Message {
        let mut progress = self.progress.lock().unwrap();
        let step = progress.entry(request.session_id).or_insert(0);
        let reply = if *step < self.commands.len() {
            request.reply(Action::Resp, self.commands[*step].clone())
        } else {
            request.reply(Action::EndRemoteService, self.end_body.clone())
        };
        *step += 1;
        reply
    }
}

/// Responder signature of [`ScriptedSyncEndpoint`].
pub type SyncResponder = dyn Fn(&Message) -> Result<Vec<Message>> + Send + Sync;

/// [`SyncClientEndpoint`] backed by a responder closure, with a request
/// log.
pub struct ScriptedSyncEndpoint {
    responder: Box<SyncResponder>,
    requests: Mutex<Vec<Message>>,
}

impl ScriptedSyncEndpoint {
    /// Create an endpoint answering through the given closure.
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&Message) -> Result<Vec<Message>> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create an endpoint answering from a [`ScriptedRemote`].
    pub fn from_remote(remote: ScriptedRemote) -> Self {
        Self::new(move |request| Ok(vec![remote.next_reply(request)]))
    }

    /// Every request the client sent, in order.
    pub fn requests(&self) -> Vec<Message> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SyncClientEndpoint for ScriptedSyncEndpoint {
    async fn send_request(&self, message: Message) -> Result<Vec<Message>> {
        self.requests.lock().unwrap().push(message.clone());
        (self.responder)(&message)
    }
}

/// [`AsyncClientEndpoint`] forwarding outbound envelopes into a channel,
/// with session bracket logs.
///
/// Tests drain the receiver, compute replies, and feed them back through
/// the client node's `on_message` entry point.
pub struct ChannelAsyncEndpoint {
    outbound: mpsc::UnboundedSender<Message>,
    opened: Mutex<Vec<SessionId>>,
    closed: Mutex<Vec<SessionId>>,
}

impl ChannelAsyncEndpoint {
    /// Create the endpoint and the receiving half of its outbound channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let endpoint = Self {
            outbound: tx,
            opened: Mutex::new(Vec::new()),
            closed: Mutex::new(Vec::new()),
        };
        (endpoint, rx)
    }

    /// Sessions opened so far.
    pub fn opened(&self) -> Vec<SessionId> {
        self.opened.lock().unwrap().clone()
    }

    /// Sessions closed so far.
    pub fn closed(&self) -> Vec<SessionId> {
        self.closed.lock().unwrap().clone()
    }
}

#[async_trait]
impl AsyncClientEndpoint for ChannelAsyncEndpoint {
    async fn open_session(&self, session_id: &SessionId) -> Result<()> {
        self.opened.lock().unwrap().push(*session_id);
        Ok(())
    }

    async fn send_message(&self, message: Message) -> Result<()> {
        self.outbound
            .send(message)
            .map_err(|_| NodeError::Transport("outbound channel closed".into()))
    }

    async fn close_session(&self, session_id: &SessionId) -> Result<()> {
        self.closed.lock().unwrap().push(*session_id);
        Ok(())
    }
}

/// [`AsyncServerEndpoint`] that captures pushed envelopes and can be told
/// to fail delivery toward specific client nodes.
pub struct CapturingServerEndpoint {
    sent: Mutex<Vec<Message>>,
    failing_nodes: Mutex<HashSet<NodeId>>,
}

impl CapturingServerEndpoint {
    /// Create an endpoint that delivers everything.
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing_nodes: Mutex::new(HashSet::new()),
        }
    }

    /// Make every delivery toward the given client node fail.
    pub fn fail_deliveries_to(&self, node_id: NodeId) {
        self.failing_nodes.lock().unwrap().insert(node_id);
    }

    /// Every envelope pushed so far.
    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().unwrap().clone()
    }
}

impl Default for CapturingServerEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AsyncServerEndpoint for CapturingServerEndpoint {
    async fn send_message(&self, message: Message) -> Result<()> {
        if let Some(target) = message.client_node_id {
            if self.failing_nodes.lock().unwrap().contains(&target) {
                return Err(NodeError::Transport(format!(
                    "client node {target} is unreachable"
                )));
            }
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

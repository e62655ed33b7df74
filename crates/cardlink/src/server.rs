//! Server-side dispatcher.
//!
//! The server side also holds physical readers; a remote client drives
//! them by sending commands the dispatcher executes locally. Every inbound
//! envelope additionally registers its sender as a subscriber for future
//! reader or plugin events, which the dispatcher fans out best-effort,
//! evicting any subscriber whose delivery fails.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use cardlink_core::{Action, Message, NodeId, RemoteFailure, SessionId};
use cardlink_node::{
    AsyncServerEndpoint, AsyncServerNode, BoxError, MessageHandler, Node, SyncServerNode,
};

use crate::api::{ReaderApi, ReaderApiError};
use crate::error::{Result, ServiceError};

/// Registration of a remote peer interested in future events.
///
/// Identity is the client node id alone: two registrations with the same
/// node id are the same subscriber, whatever their sessions. The registry
/// maps therefore key on [`NodeId`].
#[derive(Debug, Clone)]
struct ClientInfo {
    api_level: u8,
    client_node_id: NodeId,
    session_id: SessionId,
}

enum ServerBinding {
    Sync(Arc<SyncServerNode>),
    Async(Arc<AsyncServerNode>),
}

/// The server-side local service.
pub struct ServerService {
    api: Arc<dyn ReaderApi>,
    node: Arc<dyn Node>,
    binding: ServerBinding,
    /// Subscribers without a reader binding (plugin-level commands).
    plugin_clients: RwLock<HashMap<NodeId, ClientInfo>>,
    /// Per-reader subscriber sets, created lazily on first use.
    reader_clients: RwLock<HashMap<String, HashMap<NodeId, ClientInfo>>>,
}

impl ServerService {
    /// Start building a server service around the given collaborator.
    pub fn builder(api: Arc<dyn ReaderApi>) -> ServerServiceBuilder {
        ServerServiceBuilder {
            api,
            endpoint: None,
            pool_plugin_names: Vec::new(),
        }
    }

    /// The sync server node, for wiring the transport's request entry
    /// point.
    pub fn sync_node(&self) -> Result<Arc<SyncServerNode>> {
        match &self.binding {
            ServerBinding::Sync(node) => Ok(node.clone()),
            ServerBinding::Async(_) => Err(ServiceError::Configuration(
                "service is not configured with a sync node".into(),
            )),
        }
    }

    /// The async server node, for wiring the transport's inbound callback.
    pub fn async_node(&self) -> Result<Arc<AsyncServerNode>> {
        match &self.binding {
            ServerBinding::Async(node) => Ok(node.clone()),
            ServerBinding::Sync(_) => Err(ServiceError::Configuration(
                "service is not configured with an async node".into(),
            )),
        }
    }

    /// Record the sender of an inbound envelope as a subscriber.
    ///
    /// The first registration for a node id wins; later ones coalesce with
    /// it silently.
    async fn register_client(&self, message: &Message) {
        let Some(client_node_id) = message.client_node_id else {
            return;
        };
        let info = ClientInfo {
            api_level: message.api_level,
            client_node_id,
            session_id: message.session_id,
        };
        match &message.local_reader_name {
            Some(reader_name) => {
                self.reader_clients
                    .write()
                    .await
                    .entry(reader_name.clone())
                    .or_default()
                    .entry(client_node_id)
                    .or_insert(info);
            }
            None => {
                self.plugin_clients
                    .write()
                    .await
                    .entry(client_node_id)
                    .or_insert(info);
            }
        }
    }

    /// Execute one inbound envelope and derive its reply.
    ///
    /// Precondition failures from the collaborator become `Error` replies;
    /// anything else is fatal to this dispatch and propagates.
    async fn dispatch(&self, message: &Message) -> Result<Message> {
        if let Err(e) = message.check_api_level() {
            return Ok(message.reply(Action::Error, RemoteFailure::new(e.to_string()).to_body()));
        }

        let result = match message.action {
            Action::StartPluginsObservation => self
                .api
                .start_plugins_observation()
                .await
                .map(|_| String::new()),
            Action::StopPluginsObservation => self
                .api
                .stop_plugins_observation()
                .await
                .map(|_| String::new()),
            Action::Unknown => {
                return Ok(message.reply(
                    Action::Error,
                    RemoteFailure::new("unknown action").to_body(),
                ));
            }
            _ => {
                self.api
                    .execute_locally(&message.body, message.local_reader_name.as_deref())
                    .await
            }
        };

        match result {
            Ok(body) => Ok(message.reply(Action::Resp, body)),
            Err(ReaderApiError::Precondition(reason)) => {
                Ok(message.reply(Action::Error, RemoteFailure::new(reason).to_body()))
            }
            Err(fatal) => Err(ServiceError::Reader(fatal)),
        }
    }

    /// Entry point invoked by the reader collaborator when a plugin-level
    /// event fires. Fans out to every plugin subscriber.
    pub async fn on_plugin_event(&self, reader_name: &str, event_body: &str) {
        let targets: Vec<ClientInfo> = self
            .plugin_clients
            .read()
            .await
            .values()
            .cloned()
            .collect();

        for client in targets {
            if let Err(e) = self
                .push_event(Action::PluginEvent, reader_name, event_body, &client)
                .await
            {
                self.plugin_clients
                    .write()
                    .await
                    .remove(&client.client_node_id);
                tracing::warn!(
                    reader_name,
                    client_node_id = %client.client_node_id,
                    session_id = %client.session_id,
                    error = %e,
                    "plugin event subscriber evicted after failed delivery"
                );
            }
        }
    }

    /// Entry point invoked by the reader collaborator when a reader event
    /// fires. Fans out to the subscribers of that reader.
    pub async fn on_reader_event(&self, reader_name: &str, event_body: &str) {
        let targets: Option<Vec<ClientInfo>> = self
            .reader_clients
            .read()
            .await
            .get(reader_name)
            .map(|clients| clients.values().cloned().collect());
        let Some(targets) = targets else {
            return;
        };

        for client in targets {
            if let Err(e) = self
                .push_event(Action::ReaderEvent, reader_name, event_body, &client)
                .await
            {
                if let Some(clients) = self.reader_clients.write().await.get_mut(reader_name) {
                    clients.remove(&client.client_node_id);
                }
                tracing::warn!(
                    reader_name,
                    client_node_id = %client.client_node_id,
                    session_id = %client.session_id,
                    error = %e,
                    "reader event subscriber evicted after failed delivery"
                );
            }
        }
    }

    /// Build and push one event envelope from a subscriber's registration.
    /// The reader name is carried in both name fields.
    async fn push_event(
        &self,
        action: Action,
        reader_name: &str,
        event_body: &str,
        client: &ClientInfo,
    ) -> cardlink_node::Result<()> {
        let mut message = Message::new(action, client.session_id)
            .with_local_reader_name(reader_name)
            .with_remote_reader_name(reader_name)
            .with_body(event_body);
        message.api_level = client.api_level;
        message.client_node_id = Some(client.client_node_id);
        self.node.send_message(message).await
    }
}

#[async_trait]
impl MessageHandler for ServerService {
    async fn on_message(&self, message: Message) -> std::result::Result<(), BoxError> {
        self.register_client(&message).await;
        let reply = self.dispatch(&message).await?;
        self.node.send_message(reply).await?;
        Ok(())
    }
}

/// Builder of [`ServerService`].
pub struct ServerServiceBuilder {
    api: Arc<dyn ReaderApi>,
    endpoint: Option<ServerEndpointConfig>,
    pool_plugin_names: Vec<String>,
}

enum ServerEndpointConfig {
    Sync,
    Async(Arc<dyn AsyncServerEndpoint>),
}

impl ServerServiceBuilder {
    /// Bind a synchronous (request/reply) transport.
    pub fn with_sync_node(mut self) -> Self {
        self.endpoint = Some(ServerEndpointConfig::Sync);
        self
    }

    /// Bind an asynchronous (push/callback) transport endpoint.
    pub fn with_async_node(mut self, endpoint: Arc<dyn AsyncServerEndpoint>) -> Self {
        self.endpoint = Some(ServerEndpointConfig::Async(endpoint));
        self
    }

    /// Restrict which pool plugins the server exposes.
    pub fn with_pool_plugin_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pool_plugin_names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Create the service, wire its node, and push the pool plugin
    /// restriction to the collaborator.
    pub async fn build(self) -> Result<Arc<ServerService>> {
        let endpoint = self.endpoint.ok_or_else(|| {
            ServiceError::Configuration("a sync or async node is required".into())
        })?;

        let (node, binding): (Arc<dyn Node>, ServerBinding) = match endpoint {
            ServerEndpointConfig::Sync => {
                let node = Arc::new(SyncServerNode::new());
                (node.clone(), ServerBinding::Sync(node))
            }
            ServerEndpointConfig::Async(endpoint) => {
                let node = Arc::new(AsyncServerNode::new(endpoint));
                (node.clone(), ServerBinding::Async(node))
            }
        };

        let service = Arc::new(ServerService {
            api: self.api,
            node,
            binding,
            plugin_clients: RwLock::new(HashMap::new()),
            reader_clients: RwLock::new(HashMap::new()),
        });

        let handler: Arc<dyn MessageHandler> = service.clone();
        match &service.binding {
            ServerBinding::Sync(node) => node.bind_handler(&handler),
            ServerBinding::Async(node) => node.bind_handler(&handler),
        }

        service
            .api
            .set_pool_plugin_names(&self.pool_plugin_names)
            .await?;
        Ok(service)
    }
}

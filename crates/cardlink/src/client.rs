//! Client-side transaction driver.
//!
//! The client side holds the physical reader and delegates the business
//! logic to a remote peer: it opens a session, announces the service to
//! execute, then turns into a pure executor: the remote side sends
//! commands, the client runs them against the local reader and sends the
//! results back, until a terminal envelope arrives.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use cardlink_core::{Action, Message, RemoteFailure, SessionId};
use cardlink_node::{
    AsyncClientEndpoint, AsyncClientNode, BoxError, MessageHandler, Node, SyncClientEndpoint,
    SyncClientNode,
};

use crate::api::{ReaderApi, ReaderApiError};
use crate::error::{Result, ServiceError};
use crate::filter::{EventDecision, ReaderEvent, ReaderEventFilter};

/// Parameters of one remote service execution.
#[derive(Debug, Clone)]
pub struct RemoteServiceRequest {
    /// Free-form identifier of the remote service to execute.
    pub service_id: String,
    /// Name of the local reader to manage remotely.
    pub local_reader_name: String,
    /// Initial card content to transmit, as an opaque payload.
    pub initial_card_content: Option<Value>,
    /// Declared type name of the initial card content.
    pub initial_card_content_type: Option<String>,
    /// Additional input payload for the remote service.
    pub input_data: Option<Value>,
    /// Whether the local reader should be observed for the remote peer.
    pub with_reader_observation: bool,
}

impl RemoteServiceRequest {
    /// Create a request for the given service and local reader.
    pub fn new(service_id: impl Into<String>, local_reader_name: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            local_reader_name: local_reader_name.into(),
            initial_card_content: None,
            initial_card_content_type: None,
            input_data: None,
            with_reader_observation: false,
        }
    }

    /// Attach an input payload for the remote service.
    pub fn with_input_data(mut self, input_data: Value) -> Self {
        self.input_data = Some(input_data);
        self
    }

    /// Attach the initial card content and its declared type name.
    pub fn with_initial_card_content(
        mut self,
        content: Value,
        type_name: impl Into<String>,
    ) -> Self {
        self.initial_card_content = Some(content);
        self.initial_card_content_type = Some(type_name.into());
        self
    }

    /// Request observation of the local reader for the remote peer.
    pub fn with_reader_observation(mut self) -> Self {
        self.with_reader_observation = true;
        self
    }
}

/// Body of the initial `ExecuteRemoteService` envelope.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExecuteServiceBody<'a> {
    service_id: &'a str,
    is_reader_contactless: bool,
    is_reader_observable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    initial_card_content: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    initial_card_content_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    input_data: Option<&'a Value>,
}

/// Body of a one-shot `ReaderEvent` envelope.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ReaderEventBody<'a> {
    event: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    input_data: Option<&'a Value>,
}

/// Output member of a terminal `EndRemoteService` body.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OutputBody {
    #[serde(default)]
    output_data: Option<Value>,
}

enum ClientBinding {
    Sync(Arc<SyncClientNode>),
    Async(Arc<AsyncClientNode>),
}

/// The client-side local service.
///
/// Built once per process via [`ClientService::builder`]; the transport
/// binding is fixed at construction. All methods may be called
/// concurrently for independent sessions.
pub struct ClientService {
    api: Arc<dyn ReaderApi>,
    node: Arc<dyn Node>,
    binding: ClientBinding,
    filter: Option<Arc<dyn ReaderEventFilter>>,
    /// local reader name -> remote reader name, recorded when observation
    /// is requested and consumed by event forwarding.
    reader_mappings: RwLock<HashMap<String, String>>,
}

impl ClientService {
    /// Start building a client service around the given collaborator.
    pub fn builder(api: Arc<dyn ReaderApi>) -> ClientServiceBuilder {
        ClientServiceBuilder {
            api,
            endpoint: None,
            filter: None,
        }
    }

    /// The async client node, for wiring the transport's inbound callback.
    pub fn async_node(&self) -> Result<Arc<AsyncClientNode>> {
        match &self.binding {
            ClientBinding::Async(node) => Ok(node.clone()),
            ClientBinding::Sync(_) => Err(ServiceError::Configuration(
                "service is not configured with an async node".into(),
            )),
        }
    }

    /// Execute a service remotely, driving the local reader on behalf of
    /// the remote peer until it terminates the transaction.
    ///
    /// Returns the output payload embedded in the terminal envelope,
    /// deserialized to `T`, or `None` if the peer returned nothing.
    pub async fn execute_remote_service<T: DeserializeOwned>(
        &self,
        request: RemoteServiceRequest,
    ) -> Result<Option<T>> {
        if request.service_id.is_empty() {
            return Err(ServiceError::Precondition(
                "service id must not be empty".into(),
            ));
        }
        if request.local_reader_name.is_empty() {
            return Err(ServiceError::Precondition(
                "local reader name must not be empty".into(),
            ));
        }
        if request.with_reader_observation && self.filter.is_none() {
            return Err(ServiceError::Configuration(
                "reader observation requires a reader event filter".into(),
            ));
        }

        // Collaborator lookups run before the session opens, so an unknown
        // reader surfaces as a precondition failure with no envelope sent.
        let is_contactless = self
            .api
            .is_reader_contactless(&request.local_reader_name)
            .await?;
        if request.with_reader_observation
            && !self
                .api
                .is_reader_observable(&request.local_reader_name)
                .await?
        {
            return Err(ServiceError::Precondition(format!(
                "reader '{}' is not observable",
                request.local_reader_name
            )));
        }

        let session_id = SessionId::random();
        tracing::debug!(
            service_id = %request.service_id,
            reader = %request.local_reader_name,
            session_id = %session_id,
            "starting remote service execution"
        );

        let body = serde_json::to_string(&ExecuteServiceBody {
            service_id: &request.service_id,
            is_reader_contactless: is_contactless,
            is_reader_observable: request.with_reader_observation,
            initial_card_content: request.initial_card_content.as_ref(),
            initial_card_content_type: request.initial_card_content_type.as_deref(),
            input_data: request.input_data.as_ref(),
        })?;
        let first = Message::new(Action::ExecuteRemoteService, session_id)
            .with_local_reader_name(&request.local_reader_name)
            .with_body(body);

        let outcome = self.drive_execution(&session_id, first, &request).await;
        self.node.close_session_silently(&session_id).await;
        let last = outcome?;

        tracing::debug!(
            service_id = %request.service_id,
            session_id = %session_id,
            "finished remote service execution"
        );
        extract_output(&last)
    }

    async fn drive_execution(
        &self,
        session_id: &SessionId,
        first: Message,
        request: &RemoteServiceRequest,
    ) -> Result<Message> {
        self.node.open_session(session_id).await?;
        let message = self.node.send_request(first).await?;

        if request.with_reader_observation {
            if let Some(remote) = message.remote_reader_name.clone() {
                self.reader_mappings
                    .write()
                    .await
                    .insert(request.local_reader_name.clone(), remote);
            }
            self.api
                .start_reader_observation(&request.local_reader_name)
                .await?;
        }

        self.process_transaction(message).await
    }

    /// The duplex core: execute each received command locally and send the
    /// outcome back, until the peer terminates the transaction.
    async fn process_transaction(&self, mut message: Message) -> Result<Message> {
        loop {
            message.check_api_level()?;
            if message.is_terminal() {
                break;
            }
            if message.action == Action::Unknown {
                return Err(cardlink_core::MessageError::UnknownAction.into());
            }

            let reply = match self
                .api
                .execute_locally(&message.body, message.local_reader_name.as_deref())
                .await
            {
                Ok(result) => message.reply(Action::Resp, result),
                Err(ReaderApiError::Precondition(reason)) => {
                    message.reply(Action::Error, RemoteFailure::new(reason).to_body())
                }
                Err(fatal) => return Err(fatal.into()),
            };

            // Deliver the outcome and fetch the next command in one round
            // trip.
            message = self.node.send_request(reply).await?;
        }

        if message.action == Action::Error {
            return Err(ServiceError::Remote(RemoteFailure::from_body_lossy(
                &message.body,
            )));
        }
        Ok(message)
    }

    /// Entry point invoked by the reader collaborator when an observed
    /// local reader fires an event.
    ///
    /// Errors never escape: the filter decides through
    /// [`on_broadcast_error`](ReaderEventFilter::on_broadcast_error)
    /// whether observation of the reader stops.
    pub async fn on_reader_event(&self, reader_name: &str, event_body: &str) {
        let Some(filter) = self.filter.as_ref() else {
            tracing::warn!(reader_name, "reader event dropped: no filter configured");
            return;
        };

        let event = ReaderEvent {
            reader_name: reader_name.to_string(),
            body: event_body.to_string(),
        };
        let input_data = match filter.before_broadcast(&event) {
            EventDecision::Forward(input_data) => input_data,
            EventDecision::Suppress => {
                tracing::debug!(reader_name, "reader event broadcast suppressed by filter");
                return;
            }
        };

        match self.broadcast_event(&event, input_data).await {
            Ok(output) => filter.after_broadcast(output),
            Err(error) => {
                tracing::warn!(reader_name, error = %error, "reader event broadcast failed");
                if filter.on_broadcast_error(&error) {
                    if let Err(e) = self.api.stop_reader_observation(reader_name).await {
                        tracing::warn!(reader_name, error = %e, "failed to stop reader observation");
                    }
                    self.reader_mappings.write().await.remove(reader_name);
                }
            }
        }
    }

    /// Forward one reader event through the transaction machinery: a fresh
    /// session, the same open/loop/close shape, a single round trip in the
    /// common case.
    async fn broadcast_event(
        &self,
        event: &ReaderEvent,
        input_data: Option<Value>,
    ) -> Result<Option<Value>> {
        let remote_reader_name = self
            .reader_mappings
            .read()
            .await
            .get(&event.reader_name)
            .cloned()
            .ok_or_else(|| {
                ServiceError::Precondition(format!(
                    "reader '{}' is not observed remotely",
                    event.reader_name
                ))
            })?;

        let session_id = SessionId::random();
        let body = serde_json::to_string(&ReaderEventBody {
            event: &event.body,
            input_data: input_data.as_ref(),
        })?;
        let first = Message::new(Action::ReaderEvent, session_id)
            .with_local_reader_name(&event.reader_name)
            .with_remote_reader_name(remote_reader_name)
            .with_body(body);

        let outcome = self.drive(&session_id, first).await;
        self.node.close_session_silently(&session_id).await;
        extract_output(&outcome?)
    }

    async fn drive(&self, session_id: &SessionId, first: Message) -> Result<Message> {
        self.node.open_session(session_id).await?;
        let message = self.node.send_request(first).await?;
        self.process_transaction(message).await
    }
}

#[async_trait]
impl MessageHandler for ClientService {
    async fn on_message(&self, message: Message) -> std::result::Result<(), BoxError> {
        // The client expects no unsolicited envelopes; an uncorrelated one
        // must never be matched into a session.
        tracing::warn!(
            session_id = %message.session_id,
            action = ?message.action,
            "unsolicited message discarded by client service"
        );
        Ok(())
    }
}

fn extract_output<T: DeserializeOwned>(message: &Message) -> Result<Option<T>> {
    if message.body.is_empty() {
        return Ok(None);
    }
    let body: OutputBody = serde_json::from_str(&message.body)?;
    match body.output_data {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Builder of [`ClientService`].
pub struct ClientServiceBuilder {
    api: Arc<dyn ReaderApi>,
    endpoint: Option<ClientEndpointConfig>,
    filter: Option<Arc<dyn ReaderEventFilter>>,
}

enum ClientEndpointConfig {
    Sync(Arc<dyn SyncClientEndpoint>),
    Async(Arc<dyn AsyncClientEndpoint>, Duration),
}

impl ClientServiceBuilder {
    /// Bind a synchronous (request/reply) transport endpoint.
    pub fn with_sync_node(mut self, endpoint: Arc<dyn SyncClientEndpoint>) -> Self {
        self.endpoint = Some(ClientEndpointConfig::Sync(endpoint));
        self
    }

    /// Bind an asynchronous (push/callback) transport endpoint. The
    /// timeout defines how long the client waits for each peer reply
    /// before cancelling the transaction.
    pub fn with_async_node(
        mut self,
        endpoint: Arc<dyn AsyncClientEndpoint>,
        timeout: Duration,
    ) -> Self {
        self.endpoint = Some(ClientEndpointConfig::Async(endpoint, timeout));
        self
    }

    /// Install the reader-event filter, required for reader observation.
    pub fn with_reader_event_filter(mut self, filter: Arc<dyn ReaderEventFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Create the service and wire its node.
    pub fn build(self) -> Result<Arc<ClientService>> {
        let endpoint = self.endpoint.ok_or_else(|| {
            ServiceError::Configuration("a sync or async node endpoint is required".into())
        })?;

        let (node, binding): (Arc<dyn Node>, ClientBinding) = match endpoint {
            ClientEndpointConfig::Sync(endpoint) => {
                let node = Arc::new(SyncClientNode::new(endpoint));
                (node.clone(), ClientBinding::Sync(node))
            }
            ClientEndpointConfig::Async(endpoint, timeout) => {
                if timeout.is_zero() {
                    return Err(ServiceError::Configuration(
                        "async node timeout must be greater than zero".into(),
                    ));
                }
                let node = Arc::new(AsyncClientNode::new(endpoint, timeout));
                (node.clone(), ClientBinding::Async(node))
            }
        };

        let service = Arc::new(ClientService {
            api: self.api,
            node,
            binding,
            filter: self.filter,
            reader_mappings: RwLock::new(HashMap::new()),
        });

        let handler: Arc<dyn MessageHandler> = service.clone();
        match &service.binding {
            ClientBinding::Sync(node) => node.bind_handler(&handler),
            ClientBinding::Async(node) => node.bind_handler(&handler),
        }
        Ok(service)
    }
}

//! The message envelope and its action vocabulary.
//!
//! Every exchange between a local service and its remote peer travels in a
//! [`Message`]. The envelope is pure data: the only behavior it carries is
//! copy-construction of a reply from a request, which preserves all
//! correlation fields.

use serde::{Deserialize, Serialize};

use crate::error::MessageError;
use crate::ids::{NodeId, SessionId};

/// Current protocol level of the message envelope.
pub const API_LEVEL: u8 = 1;

/// Closed action vocabulary.
///
/// An action is both a routing key and a state label: the transaction loop
/// keeps running exactly as long as the received action is non-terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Initiate a remote-delegated transaction (client to server).
    ExecuteRemoteService,
    /// Result of the command the peer sent (either side, as reply).
    Resp,
    /// The last operation failed; the body carries a serialized failure.
    Error,
    /// Transaction complete, no more commands (server to client).
    EndRemoteService,
    /// A local reader event occurred.
    ReaderEvent,
    /// A plugin-level event occurred (server to client).
    PluginEvent,
    /// Start server-side plugin observation (client to server).
    StartPluginsObservation,
    /// Stop server-side plugin observation (client to server).
    StopPluginsObservation,
    /// Fallback for actions this build does not know. The wire format is
    /// external input; dispatch points must handle this variant.
    Unknown,
}

impl Action {
    /// Wire name of this action.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::ExecuteRemoteService => "EXECUTE_REMOTE_SERVICE",
            Action::Resp => "RESP",
            Action::Error => "ERROR",
            Action::EndRemoteService => "END_REMOTE_SERVICE",
            Action::ReaderEvent => "READER_EVENT",
            Action::PluginEvent => "PLUGIN_EVENT",
            Action::StartPluginsObservation => "START_PLUGINS_OBSERVATION",
            Action::StopPluginsObservation => "STOP_PLUGINS_OBSERVATION",
            Action::Unknown => "UNKNOWN",
        }
    }

    /// Decode a wire name, mapping anything unrecognized to
    /// [`Action::Unknown`].
    pub fn from_wire(name: &str) -> Self {
        match name {
            "EXECUTE_REMOTE_SERVICE" => Action::ExecuteRemoteService,
            "RESP" => Action::Resp,
            "ERROR" => Action::Error,
            "END_REMOTE_SERVICE" => Action::EndRemoteService,
            "READER_EVENT" => Action::ReaderEvent,
            "PLUGIN_EVENT" => Action::PluginEvent,
            "START_PLUGINS_OBSERVATION" => Action::StartPluginsObservation,
            "STOP_PLUGINS_OBSERVATION" => Action::StopPluginsObservation,
            _ => Action::Unknown,
        }
    }
}

impl Serialize for Action {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Action {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Action::from_wire(&name))
    }
}

/// The wire unit of the protocol.
///
/// Within one transaction the `session_id` is constant across every
/// exchanged envelope. For asynchronous transports, correlation combines
/// `session_id` with `client_node_id` since requests and pushes interleave
/// on the same connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Protocol level of this envelope. Checked on dispatch, recorded per
    /// subscriber, and propagated into every derived envelope.
    pub api_level: u8,
    /// Correlation key of the owning transaction.
    pub session_id: SessionId,
    /// Routing key and state label.
    pub action: Action,
    /// Identifier of the client-side transport endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_node_id: Option<NodeId>,
    /// Identifier of the server-side transport endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_node_id: Option<NodeId>,
    /// Reader identity on the side holding the physical reader.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_reader_name: Option<String>,
    /// Reader identity allocated by the remote peer. May equal the local
    /// name for fire-and-forget event forwarding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_reader_name: Option<String>,
    /// Opaque payload. Produced and consumed by the application layers;
    /// the protocol only embeds or detects the serialized failure form.
    #[serde(default)]
    pub body: String,
}

impl Message {
    /// Create a new envelope at the current API level with empty body.
    pub fn new(action: Action, session_id: SessionId) -> Self {
        Self {
            api_level: API_LEVEL,
            session_id,
            action,
            client_node_id: None,
            server_node_id: None,
            local_reader_name: None,
            remote_reader_name: None,
            body: String::new(),
        }
    }

    /// Set the body.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Set the local reader name.
    pub fn with_local_reader_name(mut self, name: impl Into<String>) -> Self {
        self.local_reader_name = Some(name.into());
        self
    }

    /// Set the remote reader name.
    pub fn with_remote_reader_name(mut self, name: impl Into<String>) -> Self {
        self.remote_reader_name = Some(name.into());
        self
    }

    /// Derive a reply from this envelope.
    ///
    /// Keeps `api_level`, `session_id`, both node ids and both reader names
    /// unchanged; replaces only the action and the body.
    pub fn reply(&self, action: Action, body: impl Into<String>) -> Self {
        Self {
            action,
            body: body.into(),
            ..self.clone()
        }
    }

    /// Whether this action ends the transaction loop.
    pub fn is_terminal(&self) -> bool {
        matches!(self.action, Action::EndRemoteService | Action::Error)
    }

    /// Check that the peer's API level is one this build can serve.
    pub fn check_api_level(&self) -> Result<(), MessageError> {
        if self.api_level > API_LEVEL {
            return Err(MessageError::UnsupportedApiLevel {
                local: API_LEVEL,
                peer: self.api_level,
            });
        }
        Ok(())
    }
}

//! # Cardlink
//!
//! Distributed execution protocol for delegated smart-card transactions.
//!
//! ## Overview
//!
//! An application holding a physical smart-card reader (the *local* side)
//! delegates its business logic to a remote peer, which drives the reader
//! as if it were local, over an arbitrary transport. Card handling itself
//! is external (the [`ReaderApi`] collaborator); this crate implements the
//! distributed execution protocol around it:
//!
//! - [`ClientService`] - opens a session, announces the remote service,
//!   then executes the peer's commands against the local reader until a
//!   terminal envelope arrives
//! - [`ServerService`] - executes inbound commands against the local
//!   reader/plugin API and fans out reader/plugin events to registered
//!   remote subscribers, evicting any subscriber whose delivery fails
//! - [`ReaderEventFilter`] - client-side policy around each forwarded
//!   reader event, including the only consumer-controlled circuit breaker
//!
//! Transport mechanics live one layer down in `cardlink-node`; the wire
//! envelope lives in `cardlink-core`.
//!
//! ## Message Flow
//!
//! ```text
//! Client driver                        Remote peer
//!   |-------- EXECUTE_REMOTE_SERVICE --->|
//!   |<------- command (RESP) ------------|
//!   |-------- RESP / ERROR ------------->|
//!   |<------- command (RESP) ------------|
//!   |-------- RESP / ERROR ------------->|
//!   |<------- END_REMOTE_SERVICE --------|   (or ERROR)
//! ```
//!
//! Independently, local reader/plugin events flow from the server
//! dispatcher to every registered remote subscriber as `READER_EVENT` /
//! `PLUGIN_EVENT` pushes.

pub mod api;
pub mod client;
pub mod error;
pub mod filter;
pub mod server;

// Re-export component crates
pub use cardlink_core as core;
pub use cardlink_node as node;

// Re-export main types for convenience
pub use api::{ApiResult, ReaderApi, ReaderApiError};
pub use client::{ClientService, ClientServiceBuilder, RemoteServiceRequest};
pub use error::{Result, ServiceError};
pub use filter::{EventDecision, ReaderEvent, ReaderEventFilter};
pub use server::{ServerService, ServerServiceBuilder};

// Re-export commonly used wire types
pub use cardlink_core::{Action, Message, NodeId, RemoteFailure, SessionId, API_LEVEL};

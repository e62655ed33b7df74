//! # Cardlink Core
//!
//! Wire primitives for the cardlink distributed execution protocol:
//! the message envelope, its closed action vocabulary, session and node
//! identifiers, and the serialized failure payload.
//!
//! This crate contains no I/O and no transport logic. It is pure data
//! exchanged between the node layer and the services.
//!
//! ## Key Types
//!
//! - [`Message`] - The envelope carried on every exchange
//! - [`Action`] - Routing key and transaction state label
//! - [`SessionId`] / [`NodeId`] - 128-bit random correlation identifiers
//! - [`RemoteFailure`] - The error substructure embedded in `Error` bodies

pub mod error;
pub mod failure;
pub mod ids;
pub mod message;

pub use error::MessageError;
pub use failure::RemoteFailure;
pub use ids::{NodeId, SessionId};
pub use message::{Action, Message, API_LEVEL};

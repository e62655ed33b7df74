//! # Cardlink Node
//!
//! Transport abstraction for the cardlink protocol.
//!
//! ## Overview
//!
//! A *node* binds a local service to exactly one transport discipline and
//! hides the transport mechanics behind a uniform contract: open/close a
//! session bracket, fire-and-forget sends, and request/reply exchanges.
//! Two disciplines exist, each in a client and a server flavor:
//!
//! - **Synchronous** (request/reply): the transport call itself blocks and
//!   returns the reply envelopes directly, as with an HTTP round trip.
//! - **Asynchronous** (push/callback): send and receive are decoupled; the
//!   client node parks `send_request` callers until the transport feeds
//!   the correlated reply back in, bounded by a timeout. This is the only
//!   genuine suspension point in the system.
//!
//! The transport side of the seam is the endpoint SPI ([`endpoint`]),
//! implemented by the application; the service side is the [`Node`] trait
//! consumed by the transaction drivers, plus the [`MessageHandler`]
//! callback a node invokes for every uncorrelated inbound envelope.
//!
//! ## Correlation
//!
//! Within one session, envelopes are strictly request-then-reply. Sync
//! nodes correlate by session id alone; async nodes additionally require
//! the envelope to carry their own node id, since requests and event
//! pushes interleave on the same connection. A reply that correlates to
//! nothing is never matched to another session: it is handed to the
//! service or discarded with a warning.

pub mod client;
pub mod endpoint;
pub mod error;
pub mod node;
pub mod server;

pub use client::{AsyncClientNode, SyncClientNode};
pub use endpoint::{
    AsyncClientEndpoint, AsyncServerEndpoint, MessageHandler, SyncClientEndpoint,
};
pub use error::{BoxError, NodeError, Result};
pub use node::Node;
pub use server::{AsyncServerNode, SyncServerNode};

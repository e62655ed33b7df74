//! # Cardlink Testkit
//!
//! Testing utilities for the cardlink protocol.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - [`FakeReaderApi`] - an in-memory reader collaborator with scriptable
//!   command outcomes and a call log
//! - [`ScriptedRemote`] / [`ScriptedSyncEndpoint`] - a fake remote
//!   controller driving transactions to completion
//! - [`ChannelAsyncEndpoint`] - an async client endpoint whose outbound
//!   envelopes land in a channel, with session bracket logs
//! - [`CapturingServerEndpoint`] - an async server endpoint with
//!   programmable per-client delivery failures
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cardlink::{ClientService, RemoteServiceRequest};
//! use cardlink_testkit::{FakeReader, FakeReaderApi, ScriptedRemote, ScriptedSyncEndpoint};
//!
//! async fn example() {
//!     let api = Arc::new(FakeReaderApi::new().with_reader(
//!         "reader-1",
//!         FakeReader { contactless: true, observable: false },
//!     ));
//!     let remote = ScriptedRemote::new(["cmd"], r#"{"outputData":"ok"}"#);
//!     let endpoint = Arc::new(ScriptedSyncEndpoint::from_remote(remote));
//!
//!     let client = ClientService::builder(api)
//!         .with_sync_node(endpoint)
//!         .build()
//!         .unwrap();
//!
//!     let output: Option<String> = client
//!         .execute_remote_service(RemoteServiceRequest::new("VALIDATION", "reader-1"))
//!         .await
//!         .unwrap();
//!     assert_eq!(output.as_deref(), Some("ok"));
//! }
//! ```

pub mod endpoints;
pub mod fixtures;

pub use endpoints::{
    CapturingServerEndpoint, ChannelAsyncEndpoint, ScriptedRemote, ScriptedSyncEndpoint,
    SyncResponder,
};
pub use fixtures::{FakeReader, FakeReaderApi};

/// Install a debug-level subscriber writing through the test harness.
/// Safe to call from every test; only the first call wins.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

//! The consumed reader/plugin collaborator API.
//!
//! Card handling itself is external to this crate: enumeration, APDU
//! exchange and selection logic live behind this trait. The services only
//! hand opaque command bodies through it and react to its two failure
//! classes.

use async_trait::async_trait;
use thiserror::Error;

/// Failure classes of the reader collaborator.
#[derive(Debug, Error)]
pub enum ReaderApiError {
    /// The command cannot be run in the current state (unknown reader,
    /// card absent, ...). This is the only class the protocol converts
    /// into an `Error` envelope for the peer.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// Any other failure. Fatal to the operation in progress; never
    /// converted into a protocol envelope.
    #[error("reader failure: {0}")]
    Unexpected(String),
}

/// Result type for collaborator operations.
pub type ApiResult<T> = std::result::Result<T, ReaderApiError>;

/// Local reader/plugin access, implemented outside this crate.
///
/// Implementations must be thread-safe: dispatch and event fan-out call in
/// concurrently.
#[async_trait]
pub trait ReaderApi: Send + Sync {
    /// Execute an opaque command body against a local reader (or against
    /// the plugin layer when no reader name is carried) and return the
    /// opaque result body.
    async fn execute_locally(&self, body: &str, reader_name: Option<&str>) -> ApiResult<String>;

    /// Whether the given reader uses a contactless protocol.
    async fn is_reader_contactless(&self, reader_name: &str) -> ApiResult<bool>;

    /// Whether the given reader supports observation.
    async fn is_reader_observable(&self, reader_name: &str) -> ApiResult<bool>;

    /// Start observing the given reader.
    async fn start_reader_observation(&self, reader_name: &str) -> ApiResult<()>;

    /// Stop observing the given reader.
    async fn stop_reader_observation(&self, reader_name: &str) -> ApiResult<()>;

    /// Start plugin-level observation.
    async fn start_plugins_observation(&self) -> ApiResult<()>;

    /// Stop plugin-level observation.
    async fn stop_plugins_observation(&self) -> ApiResult<()>;

    /// Restrict which pool plugins are exposed. Set once at connect time.
    async fn set_pool_plugin_names(&self, names: &[String]) -> ApiResult<()>;
}

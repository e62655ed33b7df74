//! Fake reader collaborator.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use cardlink::api::{ApiResult, ReaderApi, ReaderApiError};

/// Registered fake reader.
#[derive(Debug, Clone, Copy)]
pub struct FakeReader {
    pub contactless: bool,
    pub observable: bool,
}

/// In-memory [`ReaderApi`] with scriptable command outcomes and a call
/// log.
///
/// `execute_locally` pops scripted outcomes in order; once the script is
/// exhausted it echoes the command body back as `executed:<body>`.
pub struct FakeReaderApi {
    readers: Mutex<HashMap<String, FakeReader>>,
    observed_readers: Mutex<HashSet<String>>,
    plugins_observed: Mutex<bool>,
    pool_plugin_names: Mutex<Vec<String>>,
    scripted_executions: Mutex<VecDeque<ApiResult<String>>>,
    calls: Mutex<Vec<String>>,
}

impl FakeReaderApi {
    /// Create an empty fake with no registered readers.
    pub fn new() -> Self {
        Self {
            readers: Mutex::new(HashMap::new()),
            observed_readers: Mutex::new(HashSet::new()),
            plugins_observed: Mutex::new(false),
            pool_plugin_names: Mutex::new(Vec::new()),
            scripted_executions: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Register a reader.
    pub fn with_reader(self, name: &str, reader: FakeReader) -> Self {
        self.readers.lock().unwrap().insert(name.to_string(), reader);
        self
    }

    /// Queue the outcome of the next `execute_locally` call.
    pub fn script_execution(&self, outcome: ApiResult<String>) {
        self.scripted_executions.lock().unwrap().push_back(outcome);
    }

    /// Whether the given reader is currently observed.
    pub fn is_observing(&self, reader_name: &str) -> bool {
        self.observed_readers.lock().unwrap().contains(reader_name)
    }

    /// Whether plugin observation is currently on.
    pub fn plugins_observed(&self) -> bool {
        *self.plugins_observed.lock().unwrap()
    }

    /// The pool plugin names last pushed by the service.
    pub fn pool_plugin_names(&self) -> Vec<String> {
        self.pool_plugin_names.lock().unwrap().clone()
    }

    /// The recorded call log, one `name:detail` entry per invocation.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn known(&self, reader_name: &str) -> ApiResult<FakeReader> {
        self.readers
            .lock()
            .unwrap()
            .get(reader_name)
            .copied()
            .ok_or_else(|| {
                ReaderApiError::Precondition(format!("reader '{reader_name}' is not registered"))
            })
    }
}

impl Default for FakeReaderApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReaderApi for FakeReaderApi {
    async fn execute_locally(&self, body: &str, reader_name: Option<&str>) -> ApiResult<String> {
        self.record(format!("execute_locally:{}", reader_name.unwrap_or("-")));
        if let Some(name) = reader_name {
            self.known(name)?;
        }
        match self.scripted_executions.lock().unwrap().pop_front() {
            Some(outcome) => outcome,
            None => Ok(format!("executed:{body}")),
        }
    }

    async fn is_reader_contactless(&self, reader_name: &str) -> ApiResult<bool> {
        self.record(format!("is_reader_contactless:{reader_name}"));
        Ok(self.known(reader_name)?.contactless)
    }

    async fn is_reader_observable(&self, reader_name: &str) -> ApiResult<bool> {
        self.record(format!("is_reader_observable:{reader_name}"));
        Ok(self.known(reader_name)?.observable)
    }

    async fn start_reader_observation(&self, reader_name: &str) -> ApiResult<()> {
        self.record(format!("start_reader_observation:{reader_name}"));
        self.known(reader_name)?;
        self.observed_readers
            .lock()
            .unwrap()
            .insert(reader_name.to_string());
        Ok(())
    }

    async fn stop_reader_observation(&self, reader_name: &str) -> ApiResult<()> {
        self.record(format!("stop_reader_observation:{reader_name}"));
        self.observed_readers.lock().unwrap().remove(reader_name);
        Ok(())
    }

    async fn start_plugins_observation(&self) -> ApiResult<()> {
        self.record("start_plugins_observation".into());
        *self.plugins_observed.lock().unwrap() = true;
        Ok(())
    }

    async fn stop_plugins_observation(&self) -> ApiResult<()> {
        self.record("stop_plugins_observation".into());
        *self.plugins_observed.lock().unwrap() = false;
        Ok(())
    }

    async fn set_pool_plugin_names(&self, names: &[String]) -> ApiResult<()> {
        self.record("set_pool_plugin_names".into());
        *self.pool_plugin_names.lock().unwrap() = names.to_vec();
        Ok(())
    }
}

//! Mock tool runner for testing.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::cancel::CancelSignal;
use crate::tools::{ToolError, ToolOutput, ToolRunner, ToolSpec};

type Handler = Arc<dyn Fn(&ToolSpec) -> Result<ToolOutput, ToolError> + Send + Sync>;

/// Mock implementation of the `ToolRunner` trait.
///
/// Handlers are registered per tool name and receive the full
/// `ToolSpec`, so they can inspect arguments and write the files the
/// real tool would have written. Unscripted tools succeed with empty
/// output. Every run is recorded for assertions.
pub struct MockRunner {
    handlers: Mutex<HashMap<String, Handler>>,
    runs: Mutex<Vec<ToolSpec>>,
}

impl std::fmt::Debug for MockRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockRunner").finish_non_exhaustive()
    }
}

impl Default for MockRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRunner {
    /// Create a runner where every tool succeeds with empty output.
    pub fn new() -> Self {
        Self {
            handlers: Mutex::new(HashMap::new()),
            runs: Mutex::new(Vec::new()),
        }
    }

    /// Register a handler for a tool name (as per `ToolSpec::tool_name`).
    pub fn on(
        &self,
        tool: &str,
        handler: impl Fn(&ToolSpec) -> Result<ToolOutput, ToolError> + Send + Sync + 'static,
    ) {
        self.handlers
            .lock()
            .unwrap()
            .insert(tool.to_string(), Arc::new(handler));
    }

    /// Make a tool fail with a non-zero-exit style error.
    pub fn fail(&self, tool: &str) {
        let name = tool.to_string();
        self.on(tool, move |_| {
            Err(ToolError::Failed {
                tool: name.clone(),
                log_path: PathBuf::from(format!("/tmp/{}-mock.log", name)),
            })
        });
    }

    /// How many times a tool ran.
    pub fn runs_of(&self, tool: &str) -> usize {
        self.runs
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.tool_name() == tool)
            .count()
    }

    /// The most recent invocation of a tool.
    pub fn last_run_of(&self, tool: &str) -> Option<ToolSpec> {
        self.runs
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|s| s.tool_name() == tool)
            .cloned()
    }

    /// Every invocation, in call order.
    pub fn all_runs(&self) -> Vec<ToolSpec> {
        self.runs.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolRunner for MockRunner {
    async fn run(&self, spec: &ToolSpec, _cancel: &CancelSignal) -> Result<ToolOutput, ToolError> {
        self.runs.lock().unwrap().push(spec.clone());

        let handler = self.handlers.lock().unwrap().get(&spec.tool_name()).cloned();
        match handler {
            Some(handler) => handler(spec),
            None => Ok(ToolOutput::default()),
        }
    }
}

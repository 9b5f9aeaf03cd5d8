//! Tool Module
//!
//! Code execution against the session's dataset.

mod code_exec;

pub use code_exec::PythonRunner;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::agent::AgentResult;
use crate::orchestrator::DatasetDescriptor;

/// What running a script produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub stdout: String,
    /// Error text when the script failed
    pub error: Option<String>,
    /// Files the script wrote, such as rendered figures
    pub artifacts: Vec<PathBuf>,
}

impl ExecutionOutcome {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            ..Default::default()
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Runs generated code with `df` bound to the dataset.
///
/// `Err` means the runner itself could not run; a script that ran and failed
/// is an `Ok` outcome carrying `error`.
#[async_trait]
pub trait CodeRunner: Send + Sync {
    async fn execute(&self, code: &str, dataset: Option<&DatasetDescriptor>) -> AgentResult<ExecutionOutcome>;
}

//! Agent errors
//!
//! Failures raised while talking to the language model, invoking an agent
//! capability, or running generated code.

use thiserror::Error;

pub type AgentResult<T> = std::result::Result<T, AgentError>;

#[derive(Debug, Error)]
pub enum AgentError {
    /// The language-model provider returned an error.
    #[error("provider error: {0}")]
    Provider(String),

    #[error("provider call timed out after {0}s")]
    Timeout(u64),

    /// A structured reply did not contain a required output field.
    #[error("missing output field '{0}' in model reply")]
    MissingField(String),

    #[error("execution failed: {0}")]
    Execution(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<AgentError>() {
            Ok(agent_err) => agent_err,
            Err(other) => AgentError::Provider(format!("{:#}", other)),
        }
    }
}

impl From<regex::Error> for AgentError {
    fn from(err: regex::Error) -> Self {
        AgentError::Validation(err.to_string())
    }
}

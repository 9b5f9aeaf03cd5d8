//! Analyst Agency
//!
//! Planning-and-execution orchestrator for data-analysis agents:
//! - Routing between conversational and analytical turns
//! - Tiered planning over a fixed agent catalog with variable data flow
//! - Sequential agent execution with per-agent failure isolation
//! - Code integration with a single repair attempt
//! - Per-session dataset, model and conversation context

pub mod agent;
pub mod config;
pub mod memory;
pub mod orchestrator;
pub mod tools;
pub mod utils;

// Re-exports for convenience
pub use agent::{AgentKind, LLMProvider};
pub use config::AnalystConfig;
pub use orchestrator::{SessionStore, Supervisor, TurnResponse};
pub use tools::{CodeRunner, PythonRunner};

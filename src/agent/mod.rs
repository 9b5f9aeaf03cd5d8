//! Agent Module
//!
//! Language-model providers, structured prompts, and the catalog of analysis
//! agents the orchestrator can run.

mod cache;
mod error;
mod provider;
mod registry;
mod signature;
mod types;

pub use cache::{CacheStats, CachedProvider, LLMCache};
pub use error::{AgentError, AgentResult};
pub use provider::{LLMProvider, OllamaProvider, OpenAICompatibleProvider, TimeoutProvider};
pub use registry::{AgentDescriptor, AgentOutput, AgentRegistry, AgentRequest, DEFAULT_STYLING};
pub use signature::{FieldSpec, Fields, LanguageModel, Signature};
pub use types::{AgentKind, PLANNER_PREFIX};

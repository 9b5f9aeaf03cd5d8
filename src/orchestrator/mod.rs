//! Orchestrator Module
//!
//! Turns a natural-language goal into a plan over the agent catalog, runs it,
//! and combines the agents' code into one script, with per-session context.

pub mod executor;
pub mod integrator;
pub mod keywords;
pub mod plan;
pub mod planner;
pub mod router;
pub mod session;
pub mod story;
pub mod supervisor;

pub use executor::{ExecutionResult, ExecutionStatus, Executor};
pub use integrator::{CodeFragment, CombineOrigin, CombinedCode, Integrator};
pub use plan::{Plan, PlanError, PlanInstruction, PlanOrigin, PlanStep, Tier, ROOT_DATASET};
pub use planner::Planner;
pub use router::{Router, RoutingDecision, TurnMode};
pub use session::{DatasetDescriptor, SessionContext, SessionStore, SharedSession, NO_DATASET};
pub use story::{Narrative, NarrativeOrigin, StoryTeller};
pub use supervisor::{IntegrationReport, Supervisor, TurnResponse, TurnState, TurnStatus};

//! Executor - Runs a plan's agents in order
//!
//! Each agent is isolated: an error or a panic becomes that step's
//! [`ExecutionResult`] and the loop moves on to the next agent.

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use tracing::{info, warn};

use super::plan::Plan;
use crate::agent::{AgentRegistry, AgentRequest};
use crate::utils::truncate::preview;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Ok,
    Error,
}

/// Outcome of one plan step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub agent: String,
    /// Result category (`visualization`, `machine_learning`, ...)
    pub kind: String,
    pub code: String,
    pub summary: String,
    pub status: ExecutionStatus,
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn is_ok(&self) -> bool {
        self.status == ExecutionStatus::Ok
    }
}

#[derive(Clone)]
pub struct Executor {
    registry: AgentRegistry,
}

impl Executor {
    pub fn new(registry: AgentRegistry) -> Self {
        Self { registry }
    }

    /// Runs every step of `plan`. The result list always has one entry per step.
    pub async fn execute(&self, goal: &str, dataset: &str, plan: &Plan) -> Vec<ExecutionResult> {
        let mut results = Vec::with_capacity(plan.len());
        let mut prior = Vec::new();

        for (idx, step) in plan.steps.iter().enumerate() {
            info!("Running agent {}/{}: {}", idx + 1, plan.len(), step.agent);

            let instruction = step.instruction.to_agent_json();
            let prior_results = prior.join("\n");
            let request = AgentRequest {
                goal,
                dataset,
                instruction: &instruction,
                prior_results: &prior_results,
            };

            let outcome = AssertUnwindSafe(self.registry.invoke(&step.agent, &request))
                .catch_unwind()
                .await;

            let result = match outcome {
                Ok(Ok(output)) => {
                    prior.push(format!("{}: {}", step.agent, preview(&output.summary, 300)));
                    ExecutionResult {
                        agent: step.agent.to_string(),
                        kind: step.agent.result_label().to_string(),
                        code: output.code,
                        summary: output.summary,
                        status: ExecutionStatus::Ok,
                        error: None,
                    }
                }
                Ok(Err(e)) => failed(step.agent.to_string(), e.to_string()),
                Err(panic) => failed(step.agent.to_string(), panic_message(panic.as_ref())),
            };

            if let Some(err) = &result.error {
                warn!("Agent {} failed: {}", result.agent, err);
            }
            results.push(result);
        }

        results
    }
}

fn failed(agent: String, error: String) -> ExecutionResult {
    ExecutionResult {
        agent,
        kind: "error".to_string(),
        code: String::new(),
        summary: String::new(),
        status: ExecutionStatus::Error,
        error: Some(error),
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

//! Supervisor - One turn from goal to response
//!
//! ROUTE -> PLAN -> EXECUTE -> INTEGRATE -> (REPAIR) -> DONE, with ERROR
//! reachable from any state. Planning and execution failures degrade locally;
//! only an exhausted repair or an internal fault ends a turn in ERROR, and
//! both come back as a structured [`TurnResponse`].

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::executor::{panic_message, ExecutionResult, Executor};
use super::integrator::{CodeFragment, CombinedCode, Integrator};
use super::plan::Plan;
use super::planner::Planner;
use super::router::{Router, RoutingDecision, TurnMode};
use super::session::{SessionContext, SessionStore};
use super::story::{Narrative, StoryTeller};
use crate::agent::{AgentRegistry, LLMProvider, LanguageModel};
use crate::tools::{CodeRunner, ExecutionOutcome};

const CONVERSATION_ROLE: &str =
    "You are a helpful data analysis assistant. Answer conversationally and concisely. \
     When a dataset is described, ground your answer in it; suggest an analysis the user \
     could ask for when that would help.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TurnState {
    Route,
    Plan,
    Execute,
    Integrate,
    Repair,
    Done,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnStatus {
    Completed,
    Failed,
}

/// Combined code and, when a runner is attached, what running it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationReport {
    pub combined: CombinedCode,
    /// Outcome of the last execution attempt
    pub execution: Option<ExecutionOutcome>,
    /// Script produced by the repair step
    pub repaired_code: Option<String>,
    pub repair_attempted: bool,
    /// Set when execution could not be attempted
    pub note: Option<String>,
}

impl IntegrationReport {
    /// The script the turn ends with.
    pub fn final_code(&self) -> &str {
        self.repaired_code.as_deref().unwrap_or(&self.combined.code)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnResponse {
    pub turn_id: Uuid,
    pub session_id: String,
    pub mode: TurnMode,
    /// Absent when the caller skipped routing
    pub route: Option<RoutingDecision>,
    pub status: TurnStatus,
    pub plan: Option<Plan>,
    pub plan_summary: Option<String>,
    pub agent_results: Vec<ExecutionResult>,
    pub integration: Option<IntegrationReport>,
    /// One account of the agents' findings
    pub narrative: Option<Narrative>,
    /// Markdown for display
    pub final_response: String,
    pub error: Option<String>,
    /// States visited, in order
    pub trace: Vec<TurnState>,
}

impl TurnResponse {
    pub fn is_success(&self) -> bool {
        self.status == TurnStatus::Completed
    }
}

pub struct Supervisor {
    lm: LanguageModel,
    router: Router,
    sessions: Arc<SessionStore>,
    runner: Option<Arc<dyn CodeRunner>>,
    history_window: usize,
}

impl Supervisor {
    /// The store's default model is used for sessions that never chose one.
    pub fn new(provider: Arc<dyn LLMProvider>, sessions: Arc<SessionStore>) -> Self {
        let lm = LanguageModel::new(provider, sessions.default_model());
        Self {
            lm,
            router: Router::new(),
            sessions,
            runner: None,
            history_window: 3,
        }
    }

    pub fn with_runner(mut self, runner: Arc<dyn CodeRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn with_router(mut self, router: Router) -> Self {
        self.router = router;
        self
    }

    pub fn with_history_window(mut self, exchanges: usize) -> Self {
        self.history_window = exchanges;
        self
    }

    /// Entry point for one user turn. Never returns an error; failures are
    /// reported in the response.
    pub async fn run_turn(&self, goal: &str, session_id: &str) -> TurnResponse {
        self.turn(goal, session_id, None).await
    }

    /// Same as [`Supervisor::run_turn`] for callers that already know the goal
    /// is analytical. Skips ROUTE.
    pub async fn run_analysis(&self, goal: &str, session_id: &str) -> TurnResponse {
        self.turn(goal, session_id, Some(TurnMode::Analytical)).await
    }

    #[tracing::instrument(skip(self, goal, forced), fields(session = %session_id, turn = tracing::field::Empty))]
    async fn turn(&self, goal: &str, session_id: &str, forced: Option<TurnMode>) -> TurnResponse {
        let turn_id = Uuid::new_v4();
        tracing::Span::current().record("turn", tracing::field::display(turn_id));

        let session = self.sessions.get_or_create(session_id).await;
        let mut ctx = session.lock().await;

        let route = match forced {
            Some(_) => None,
            None => Some(self.router.route(goal, ctx.has_dataset())),
        };
        let mode = forced
            .or_else(|| route.as_ref().map(|r| r.mode))
            .unwrap_or(TurnMode::Analytical);

        let driven = AssertUnwindSafe(self.drive(turn_id, goal, &ctx, route.clone(), mode))
            .catch_unwind()
            .await;

        let response = match driven {
            Ok(response) => response,
            Err(panic) => {
                let detail = panic_message(panic.as_ref());
                error!("Turn {} aborted: {}", turn_id, detail);
                let message = format!("Internal orchestrator failure: {}", detail);
                let mut trace = Vec::new();
                if route.is_some() {
                    trace.push(TurnState::Route);
                }
                trace.push(TurnState::Error);
                TurnResponse {
                    turn_id,
                    session_id: session_id.to_string(),
                    mode,
                    route,
                    status: TurnStatus::Failed,
                    plan: None,
                    plan_summary: None,
                    agent_results: Vec::new(),
                    integration: None,
                    narrative: None,
                    final_response: format!("**Error:** {}", message),
                    error: Some(message),
                    trace,
                }
            }
        };

        ctx.record_exchange(goal, &response.final_response, &response.mode.to_string());
        if let Some(plan) = &response.plan {
            ctx.set_last_plan(plan.clone());
        }

        info!(
            "Turn {} finished: {:?} via {:?}",
            turn_id, response.status, response.trace
        );
        response
    }

    async fn drive(
        &self,
        turn_id: Uuid,
        goal: &str,
        ctx: &SessionContext,
        route: Option<RoutingDecision>,
        mode: TurnMode,
    ) -> TurnResponse {
        let mut trace = Vec::new();
        if route.is_some() {
            trace.push(TurnState::Route);
        }
        let lm = self.lm.with_model(ctx.model.clone());
        debug!("Turn {} runs {} on model {}", turn_id, mode, lm.model());

        let mut response = TurnResponse {
            turn_id,
            session_id: ctx.session_id.clone(),
            mode,
            route,
            status: TurnStatus::Completed,
            plan: None,
            plan_summary: None,
            agent_results: Vec::new(),
            integration: None,
            narrative: None,
            final_response: String::new(),
            error: None,
            trace: Vec::new(),
        };

        match mode {
            TurnMode::Conversational => self.converse(&lm, goal, ctx, &mut response).await,
            TurnMode::Analytical => self.analyze(&lm, goal, ctx, &mut response, &mut trace).await,
        }

        trace.push(match response.status {
            TurnStatus::Completed => TurnState::Done,
            TurnStatus::Failed => TurnState::Error,
        });
        response.trace = trace;
        response
    }

    async fn converse(&self, lm: &LanguageModel, goal: &str, ctx: &SessionContext, response: &mut TurnResponse) {
        let history = ctx.history.format_recent(self.history_window, 100);
        let mut prompt = String::new();
        if !history.is_empty() {
            prompt.push_str(&format!("Conversation so far:\n{}\n\n", history));
        }
        if ctx.has_dataset() {
            prompt.push_str(&format!("{}\n\n", ctx.dataset_text()));
        }
        prompt.push_str(&format!("User: {}", goal));

        match lm.chat(prompt, Some(CONVERSATION_ROLE.to_string())).await {
            Ok(answer) => response.final_response = answer.trim().to_string(),
            Err(e) => {
                warn!("Conversational reply failed: {}", e);
                let message = format!("Could not reach the language model: {}", e);
                response.status = TurnStatus::Failed;
                response.final_response = format!("**Error:** {}", message);
                response.error = Some(message);
            }
        }
    }

    async fn analyze(
        &self,
        lm: &LanguageModel,
        goal: &str,
        ctx: &SessionContext,
        response: &mut TurnResponse,
        trace: &mut Vec<TurnState>,
    ) {
        let dataset = ctx.dataset_text();
        let history = ctx.history.format_recent(self.history_window, 100);

        trace.push(TurnState::Plan);
        let plan = Planner::new(lm.clone()).plan(goal, &dataset, &history).await;

        trace.push(TurnState::Execute);
        let results = Executor::new(AgentRegistry::new(lm.clone()))
            .execute(goal, &dataset, &plan)
            .await;

        trace.push(TurnState::Integrate);
        let integrator = Integrator::new(lm.clone()).with_dataset_bound(ctx.has_dataset());
        let combined = integrator
            .combine(&dataset, &CodeFragment::from_results(&results))
            .await;

        let mut report = IntegrationReport {
            combined,
            execution: None,
            repaired_code: None,
            repair_attempted: false,
            note: None,
        };

        if let Some(runner) = &self.runner {
            if !report.combined.code.is_empty() {
                if let Err(message) = self
                    .run_with_repair(runner.as_ref(), &integrator, ctx, &mut report, trace)
                    .await
                {
                    response.status = TurnStatus::Failed;
                    response.error = Some(message);
                }
            }
        }

        let narrative = StoryTeller::new(lm.clone()).tell(goal, &results).await;

        response.final_response = render_response(
            &plan,
            &results,
            &report,
            narrative.as_ref(),
            response.error.as_deref(),
        );
        response.narrative = narrative;
        response.plan_summary = Some(plan.summary());
        response.plan = Some(plan);
        response.agent_results = results;
        response.integration = Some(report);
    }

    /// Runs the combined script; on failure repairs it once and runs it again.
    async fn run_with_repair(
        &self,
        runner: &dyn CodeRunner,
        integrator: &Integrator,
        ctx: &SessionContext,
        report: &mut IntegrationReport,
        trace: &mut Vec<TurnState>,
    ) -> Result<(), String> {
        let dataset = ctx.dataset.as_ref();
        let first = match runner.execute(&report.combined.code, dataset).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Code runner unavailable: {}", e);
                report.note = Some(format!("Execution skipped: {}", e));
                return Ok(());
            }
        };

        let Some(original_error) = first.error.clone() else {
            report.execution = Some(first);
            return Ok(());
        };
        report.execution = Some(first);

        warn!("Combined code failed, attempting one repair: {}", original_error);
        trace.push(TurnState::Repair);
        report.repair_attempted = true;

        let fixed = integrator
            .repair(&ctx.dataset_text(), &report.combined.code, &original_error)
            .await
            .map_err(|e| format!("Repair failed: {}\n\nOriginal error: {}", e, original_error))?;
        report.repaired_code = Some(fixed.clone());

        let second = runner.execute(&fixed, dataset).await.map_err(|e| {
            format!("Repaired code could not be executed: {}\n\nOriginal error: {}", e, original_error)
        })?;

        match second.error.clone() {
            None => {
                info!("Repaired code ran successfully");
                report.execution = Some(second);
                Ok(())
            }
            Some(detail) => {
                report.execution = Some(second);
                Err(format!(
                    "Code execution failed after one repair attempt: {}\n\nOriginal error: {}",
                    detail, original_error
                ))
            }
        }
    }
}

fn render_response(
    plan: &Plan,
    results: &[ExecutionResult],
    report: &IntegrationReport,
    narrative: Option<&Narrative>,
    error: Option<&str>,
) -> String {
    let mut out = String::new();
    if let Some(error) = error {
        out.push_str(&format!("**Error:** {}\n\n", error));
    }

    out.push_str(&format!("## Plan\n**{}** ({} tier, {})\n\n", plan.chain(), plan.tier, plan.origin));
    for (i, step) in plan.steps.iter().enumerate() {
        out.push_str(&format!(
            "### {}. {}\n- **Create:** {}\n- **Use:** {}\n- **Instruction:** {}\n\n",
            i + 1,
            step.agent,
            step.instruction.create.join(", "),
            step.instruction.uses.join(", "),
            step.instruction.instruction
        ));
    }

    out.push_str("## Results\n");
    for result in results {
        match &result.error {
            Some(err) => out.push_str(&format!("### {}\n**Failed:** {}\n\n", result.agent, err)),
            None => {
                out.push_str(&format!("### {} ({})\n", result.agent, result.kind));
                if !result.summary.is_empty() {
                    out.push_str(&format!("{}\n", result.summary));
                }
                if !result.code.is_empty() {
                    out.push_str(&format!("```python\n{}\n```\n", result.code));
                }
                out.push('\n');
            }
        }
    }

    if !report.final_code().is_empty() && results.len() > 1 {
        out.push_str(&format!("## Combined code\n```python\n{}\n```\n\n", report.final_code()));
    }

    if let Some(execution) = &report.execution {
        if !execution.stdout.trim().is_empty() {
            out.push_str(&format!("## Output\n```\n{}\n```\n\n", execution.stdout.trim()));
        }
        for artifact in &execution.artifacts {
            out.push_str(&format!("- Figure: {}\n", artifact.display()));
        }
    }
    if let Some(note) = &report.note {
        out.push_str(&format!("_{}_\n\n", note));
    }

    if let Some(narrative) = narrative {
        out.push_str(&format!("## Summary\n{}\n\n", narrative.text.trim()));
    }

    let ok = results.iter().filter(|r| r.is_ok()).count();
    out.push_str(&format!("Executed {}/{} agents successfully", ok, results.len()));
    out
}

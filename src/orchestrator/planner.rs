//! Planner - Goal to agent sequence
//!
//! Picks a complexity tier from the goal, asks the model for a plan, and falls
//! back to a one-agent plan whenever the reply is unusable or the model is
//! unreachable. [`Planner::plan`] never fails.

use tracing::{debug, info, warn};

use super::keywords::{self, ML_FALLBACK, PREPARATION, STATISTICS, VISUALIZATION};
use super::plan::{first_known_agent, Plan, PlanInstruction, PlanOrigin, Tier, ROOT_DATASET};
use crate::agent::{AgentKind, AgentRegistry, FieldSpec, LanguageModel, Signature};

/// Default `create` of a structural fallback.
pub const FALLBACK_OUTPUT: &str = "analysis_results";

const PLANNER_ROLE: &str =
    "You are a data analytics planner. From the dataset profile, the available agents and the \
     user's goal, choose the agents to run and write variable-level instructions for each. \
     Every variable an agent uses must be `df` or created by an earlier agent. \
     Keep the instructions minimal with few intermediate variables.";

const SINGLE_GUIDANCE: &str = r#"Pick exactly ONE agent.
Example goal: Visualize height and salary
plan: planner_data_viz_agent
plan_instructions: {"planner_data_viz_agent": {"create": ["scatter_plot"], "use": ["df"], "instruction": "use df to create scatter_plot of height and salary with plotly"}}"#;

const TWO_GUIDANCE: &str = r#"Use no more than TWO agents, chained with ->.
Example:
plan: planner_preprocessing_agent -> planner_data_viz_agent
plan_instructions: {"planner_preprocessing_agent": {"create": ["aggregated_data"], "use": ["df"], "instruction": "aggregate df into aggregated_data"},
"planner_data_viz_agent": {"create": ["chart"], "use": ["aggregated_data"], "instruction": "plot aggregated_data as chart"}}"#;

const MULTI_GUIDANCE: &str = r#"Chain as many agents as the goal needs with ->, but prefer fewer agents and fewer variables.
Example:
plan: planner_preprocessing_agent -> planner_sk_learn_agent -> planner_data_viz_agent
plan_instructions: {"planner_preprocessing_agent": {"create": ["cleaned_data"], "use": ["df"], "instruction": "clean df into cleaned_data"},
"planner_sk_learn_agent": {"create": ["model_results"], "use": ["cleaned_data"], "instruction": "fit a model on cleaned_data, store metrics and predictions in model_results"},
"planner_data_viz_agent": {"create": ["results_plot"], "use": ["cleaned_data", "model_results"], "instruction": "plot model_results against cleaned_data"}}"#;

fn tier_guidance(tier: Tier) -> &'static str {
    match tier {
        Tier::Single => SINGLE_GUIDANCE,
        Tier::Two => TWO_GUIDANCE,
        Tier::Multi => MULTI_GUIDANCE,
    }
}

fn planner_signature() -> Signature {
    Signature::new("planner", PLANNER_ROLE)
        .input(FieldSpec::required("dataset", "Profile of the dataset, loaded as `df`"))
        .input(FieldSpec::required("agent_desc", "The agents available in the system"))
        .input(FieldSpec::required("goal", "The user defined goal"))
        .input(FieldSpec::optional("history", "Recent conversation"))
        .input(FieldSpec::required("tier_guidance", "How many agents may be used, with an example"))
        .input(FieldSpec::required("instruction_schema", "JSON schema of one agent's instruction"))
        .output(FieldSpec::required("plan", "Agent chain separated by ->"))
        .output(FieldSpec::optional(
            "plan_instructions",
            "JSON object mapping each planned agent to its create/use/instruction",
        ))
}

#[derive(Clone)]
pub struct Planner {
    lm: LanguageModel,
}

impl Planner {
    pub fn new(lm: LanguageModel) -> Self {
        Self { lm }
    }

    /// Produce a plan for `goal`. Always returns a plan that passes validation.
    pub async fn plan(&self, goal: &str, dataset: &str, history: &str) -> Plan {
        let tier = Tier::select(goal);
        info!("Planning '{}' with the {} tier", goal, tier);

        let catalog = AgentRegistry::describe_for_planner();
        let schema = PlanInstruction::schema_json();
        let values = [
            ("dataset", dataset),
            ("agent_desc", catalog.as_str()),
            ("goal", goal),
            ("history", history),
            ("tier_guidance", tier_guidance(tier)),
            ("instruction_schema", schema.as_str()),
        ];

        let fields = match self.lm.complete(&planner_signature(), &values).await {
            Ok(fields) => fields,
            Err(e) => {
                warn!("Planner call failed ({}), using keyword fallback", e);
                return keyword_plan(goal);
            }
        };

        let plan_text = fields.get("plan").unwrap_or_default();
        let instructions = fields.get("plan_instructions").unwrap_or_default();
        debug!("Planner reply: plan='{}'", plan_text);

        match Plan::parse(tier, plan_text, instructions) {
            Ok(plan) => {
                info!("Planned {} agent(s): {}", plan.len(), plan.chain());
                plan
            }
            Err(reason) => {
                warn!("Planner reply rejected ({}), using structural fallback", reason);
                structural_plan(tier, goal, plan_text, instructions)
            }
        }
    }
}

/// One agent carrying the raw planner text as its instruction.
///
/// The agent is the first catalog agent named in the plan text, otherwise the
/// keyword-table choice for the goal.
pub fn structural_plan(tier: Tier, goal: &str, plan_text: &str, raw_instructions: &str) -> Plan {
    let agent = first_known_agent(plan_text).unwrap_or_else(|| keyword_choice(goal).0);
    let instruction = [raw_instructions, plan_text, goal]
        .into_iter()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or(goal);

    Plan::single(
        tier,
        PlanOrigin::StructuralFallback,
        agent,
        PlanInstruction::new([FALLBACK_OUTPUT], [ROOT_DATASET], instruction),
    )
}

/// Deterministic plan from the keyword table. Never calls the model.
pub fn keyword_plan(goal: &str) -> Plan {
    let (agent, instruction) = keyword_choice(goal);
    info!("Keyword fallback selected {}", agent);
    Plan::single(Tier::select(goal), PlanOrigin::KeywordFallback, agent, instruction)
}

fn keyword_choice(goal: &str) -> (AgentKind, PlanInstruction) {
    if keywords::mentions_any(goal, VISUALIZATION) {
        (
            AgentKind::DataViz,
            PlanInstruction::new(
                ["visualization"],
                [ROOT_DATASET],
                "Create a visualization based on the user's request using the uploaded dataset",
            ),
        )
    } else if keywords::mentions_any(goal, STATISTICS) {
        (
            AgentKind::StatisticalAnalytics,
            PlanInstruction::new(
                ["statistical_analysis", "correlation_matrix", "summary_statistics"],
                [ROOT_DATASET],
                "Perform comprehensive statistical analysis including descriptive statistics, correlations, and data exploration",
            ),
        )
    } else if keywords::mentions_any(goal, PREPARATION) {
        (
            AgentKind::Preprocessing,
            PlanInstruction::new(
                ["cleaned_data", "preprocessing_report"],
                [ROOT_DATASET],
                "Clean and preprocess the dataset, handle missing values, and prepare data for analysis",
            ),
        )
    } else if keywords::mentions_any(goal, ML_FALLBACK) {
        (
            AgentKind::SkLearn,
            PlanInstruction::new(
                ["trained_model", "model_metrics", "predictions"],
                [ROOT_DATASET],
                "Build and evaluate machine learning models for prediction or classification",
            ),
        )
    } else {
        (
            AgentKind::StatisticalAnalytics,
            PlanInstruction::new(
                ["exploratory_analysis", "data_insights"],
                [ROOT_DATASET],
                "Perform exploratory data analysis to understand the dataset structure and patterns",
            ),
        )
    }
}

//! Plan - Agent sequence plus per-agent create/use contracts
//!
//! Plans coming from the model go through [`Plan::parse`], which either yields
//! a plan whose sequence is a valid topological order or a [`PlanError`]
//! explaining what was wrong.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

use super::keywords::{self, CLEANING, MODELING, VISUALIZATION};
use crate::agent::AgentKind;

/// Handle of the loaded dataset, always readable.
pub const ROOT_DATASET: &str = "df";
/// Names the planner may use for the root dataset.
pub const ROOT_ALIASES: &[&str] = &[ROOT_DATASET, "original_data"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("planner returned an empty plan")]
    EmptyPlan,
    #[error("no JSON object found in plan instructions")]
    NoInstructionObject,
    #[error("plan instructions are not valid JSON: {0}")]
    InvalidJson(String),
    #[error("instruction for '{agent}' is not an object")]
    NotAnObject { agent: String },
    #[error("instruction for '{agent}' is missing '{field}'")]
    MissingField { agent: String, field: &'static str },
    #[error("instruction for '{agent}' has an invalid '{field}'")]
    InvalidField { agent: String, field: &'static str },
    #[error("no instruction for planned agent '{agent}'")]
    MissingInstruction { agent: String },
    #[error("'{agent}' uses '{variable}' before any earlier agent creates it")]
    UnresolvedInput { agent: String, variable: String },
    #[error("{tier} tier allows at most {max} agents, plan has {count}")]
    TooManyAgents { tier: Tier, max: usize, count: usize },
}

/// Planner complexity classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Single,
    Two,
    Multi,
}

impl Tier {
    /// Modeling vocabulary wins over visualization vocabulary.
    pub fn select(goal: &str) -> Self {
        if keywords::mentions_any(goal, MODELING) {
            Tier::Multi
        } else if keywords::mentions_any(goal, VISUALIZATION) && !keywords::mentions_any(goal, CLEANING) {
            Tier::Single
        } else {
            Tier::Two
        }
    }

    pub fn max_agents(&self) -> Option<usize> {
        match self {
            Tier::Single => Some(1),
            Tier::Two => Some(2),
            Tier::Multi => None,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Single => write!(f, "single-agent"),
            Tier::Two => write!(f, "two-agent"),
            Tier::Multi => write!(f, "multi-agent"),
        }
    }
}

/// The create/use/instruction contract one agent must honor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PlanInstruction {
    /// Variable names this agent creates; later agents may only reference these.
    pub create: Vec<String>,
    /// Variable names this agent reads; `df` is the loaded dataset.
    #[serde(rename = "use")]
    pub uses: Vec<String>,
    /// What the agent should do.
    pub instruction: String,
}

impl PlanInstruction {
    pub fn new<C, U>(create: C, uses: U, instruction: impl Into<String>) -> Self
    where
        C: IntoIterator,
        C::Item: Into<String>,
        U: IntoIterator,
        U::Item: Into<String>,
    {
        Self {
            create: create.into_iter().map(Into::into).collect(),
            uses: uses.into_iter().map(Into::into).collect(),
            instruction: instruction.into(),
        }
    }

    pub fn created_variables(&self) -> Vec<String> {
        variable_names(&self.create)
    }

    pub fn used_variables(&self) -> Vec<String> {
        variable_names(&self.uses)
    }

    /// The JSON form agents receive.
    pub fn to_agent_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| self.instruction.clone())
    }

    /// JSON schema embedded in planner prompts.
    pub fn schema_json() -> String {
        let schema = schemars::schema_for!(PlanInstruction);
        serde_json::to_string_pretty(&schema).unwrap_or_default()
    }
}

/// Reads variable names from create/use entries by their leading identifier,
/// so `cleaned_df (DataFrame)` yields `cleaned_df`. Comma-joined entries are split.
pub fn variable_names(entries: &[String]) -> Vec<String> {
    entries
        .iter()
        .flat_map(|entry| entry.split(','))
        .filter_map(|piece| {
            let piece = piece.trim().trim_start_matches(|c: char| c == '`' || c == '\'' || c == '"');
            let ident: String = piece
                .chars()
                .take_while(|c| c.is_alphanumeric() || *c == '_')
                .collect();
            let valid = ident.chars().next().map_or(false, |c| c.is_alphabetic() || c == '_');
            valid.then_some(ident)
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub agent: AgentKind,
    pub instruction: PlanInstruction,
}

/// How a plan came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanOrigin {
    /// Parsed from the planner's reply.
    Planned,
    /// Planner replied but the reply did not parse; one agent carries the raw text.
    StructuralFallback,
    /// Planner was unavailable; built from the keyword table.
    KeywordFallback,
}

impl fmt::Display for PlanOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanOrigin::Planned => write!(f, "planned"),
            PlanOrigin::StructuralFallback => write!(f, "structural fallback"),
            PlanOrigin::KeywordFallback => write!(f, "keyword fallback"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub tier: Tier,
    pub origin: PlanOrigin,
    pub steps: Vec<PlanStep>,
}

impl Plan {
    pub fn new(tier: Tier, origin: PlanOrigin, steps: Vec<PlanStep>) -> Self {
        Self { tier, origin, steps }
    }

    /// One-agent plan, the shape every fallback takes.
    pub fn single(tier: Tier, origin: PlanOrigin, agent: AgentKind, instruction: PlanInstruction) -> Self {
        Self::new(tier, origin, vec![PlanStep { agent, instruction }])
    }

    /// Strict parse of the planner's two output fields.
    pub fn parse(tier: Tier, plan_text: &str, instructions_text: &str) -> Result<Self, PlanError> {
        let sequence = split_chain(plan_text);
        if sequence.is_empty() {
            return Err(PlanError::EmptyPlan);
        }
        if let Some(max) = tier.max_agents() {
            if sequence.len() > max {
                return Err(PlanError::TooManyAgents { tier, max, count: sequence.len() });
            }
        }

        let instructions = parse_instructions(instructions_text)?;
        let steps = sequence
            .into_iter()
            .map(|agent| {
                instructions
                    .iter()
                    .find(|(kind, _)| *kind == agent)
                    .map(|(_, instruction)| PlanStep { agent: agent.clone(), instruction: instruction.clone() })
                    .ok_or_else(|| PlanError::MissingInstruction { agent: agent.to_string() })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let plan = Self::new(tier, PlanOrigin::Planned, steps);
        plan.validate()?;
        Ok(plan)
    }

    /// Checks that every used variable is the root dataset or created by an earlier step.
    pub fn validate(&self) -> Result<(), PlanError> {
        let mut available: HashSet<String> = ROOT_ALIASES.iter().map(|s| s.to_string()).collect();
        for step in &self.steps {
            if let Some(missing) = step
                .instruction
                .used_variables()
                .into_iter()
                .find(|v| !available.contains(v))
            {
                return Err(PlanError::UnresolvedInput {
                    agent: step.agent.to_string(),
                    variable: missing,
                });
            }
            available.extend(step.instruction.created_variables());
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn agents(&self) -> impl Iterator<Item = &AgentKind> {
        self.steps.iter().map(|s| &s.agent)
    }

    /// `a -> b -> c`
    pub fn chain(&self) -> String {
        self.agents().map(|a| a.name()).collect::<Vec<_>>().join(" -> ")
    }

    pub fn summary(&self) -> String {
        let mut out = format!("Plan ({} tier, {}): {}\n", self.tier, self.origin, self.chain());
        for (i, step) in self.steps.iter().enumerate() {
            out.push_str(&format!(
                "{}. {}\n   create: {}\n   use: {}\n   instruction: {}\n",
                i + 1,
                step.agent,
                step.instruction.create.join(", "),
                step.instruction.uses.join(", "),
                step.instruction.instruction
            ));
        }
        out
    }
}

/// Agent names from a `->` chain. No separator means a single agent.
pub fn split_chain(plan_text: &str) -> Vec<AgentKind> {
    let normalized = plan_text.replace('→', "->");
    let line = normalized
        .lines()
        .map(str::trim)
        .find(|l| l.contains("->"))
        .or_else(|| normalized.lines().map(str::trim).find(|l| !l.is_empty()))
        .unwrap_or("");

    let line = strip_label(line, "plan");
    line.split("->")
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(AgentKind::from_name)
        .filter(|kind| !matches!(kind, AgentKind::Unknown(name) if name.is_empty()))
        .collect()
}

/// First catalog agent named anywhere in free text.
pub fn first_known_agent(text: &str) -> Option<AgentKind> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .map(AgentKind::from_name)
        .find(AgentKind::is_known)
}

fn strip_label<'a>(line: &'a str, label: &str) -> &'a str {
    let lowered = line.to_lowercase();
    match lowered.strip_prefix(label) {
        Some(rest) if rest.trim_start().starts_with(':') => {
            let offset = line.len().saturating_sub(rest.trim_start().len()) + 1;
            line.get(offset..).map(str::trim).unwrap_or(line)
        }
        _ => line,
    }
}

fn parse_instructions(text: &str) -> Result<Vec<(AgentKind, PlanInstruction)>, PlanError> {
    let (start, end) = match (text.find('{'), text.rfind('}')) {
        (Some(s), Some(e)) if s < e => (s, e),
        _ => return Err(PlanError::NoInstructionObject),
    };

    let object: serde_json::Map<String, Value> =
        serde_json::from_str(&text[start..=end]).map_err(|e| PlanError::InvalidJson(e.to_string()))?;

    object
        .into_iter()
        .map(|(key, value)| {
            let agent = AgentKind::from_name(&key);
            let entry = value
                .as_object()
                .ok_or_else(|| PlanError::NotAnObject { agent: key.clone() })?;
            let create = string_list(&key, entry, "create")?;
            let uses = string_list(&key, entry, "use")?;
            let instruction = match entry.get("instruction") {
                Some(Value::String(s)) => s.trim().to_string(),
                Some(_) => return Err(PlanError::InvalidField { agent: key, field: "instruction" }),
                None => return Err(PlanError::MissingField { agent: key, field: "instruction" }),
            };
            Ok((agent, PlanInstruction { create, uses, instruction }))
        })
        .collect()
}

fn string_list(
    agent: &str,
    entry: &serde_json::Map<String, Value>,
    field: &'static str,
) -> Result<Vec<String>, PlanError> {
    let invalid = || PlanError::InvalidField { agent: agent.to_string(), field };
    match entry.get(field) {
        Some(Value::String(s)) => Ok(vec![s.trim().to_string()]),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| v.as_str().map(|s| s.trim().to_string()).ok_or_else(invalid))
            .collect(),
        Some(_) => Err(invalid()),
        None => Err(PlanError::MissingField { agent: agent.to_string(), field }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CHAIN_INSTRUCTIONS: &str = r#"{
        "planner_preprocessing_agent": {"create": ["cleaned_data"], "use": ["df"], "instruction": "clean"},
        "planner_sk_learn_agent": {"create": ["regression_model", "residuals"], "use": ["cleaned_data"], "instruction": "fit"},
        "planner_data_viz_agent": {"create": ["residual_plot"], "use": ["residuals"], "instruction": "plot"}
    }"#;

    #[test]
    fn test_tier_selection() {
        assert_eq!(Tier::select("show me a bar chart of sales"), Tier::Single);
        assert_eq!(Tier::select("clean the data and plot it"), Tier::Two);
        assert_eq!(Tier::select("plot predicted churn"), Tier::Multi);
        assert_eq!(Tier::select("summarize the columns"), Tier::Two);
        assert_eq!(Tier::select("render html summary"), Tier::Two);
    }

    #[test]
    fn test_parse_valid_chain() {
        let plan = Plan::parse(
            Tier::Multi,
            "planner_preprocessing_agent -> planner_sk_learn_agent -> planner_data_viz_agent",
            CHAIN_INSTRUCTIONS,
        )
        .unwrap();

        assert_eq!(plan.len(), 3);
        assert_eq!(plan.origin, PlanOrigin::Planned);
        assert_eq!(plan.chain(), "preprocessing_agent -> sk_learn_agent -> data_viz_agent");
        assert_eq!(plan.steps[1].instruction.uses, vec!["cleaned_data"]);
    }

    #[test]
    fn test_parse_rejects_forward_reference() {
        let err = Plan::parse(
            Tier::Multi,
            "planner_data_viz_agent -> planner_preprocessing_agent -> planner_sk_learn_agent",
            CHAIN_INSTRUCTIONS,
        )
        .unwrap_err();
        assert!(matches!(err, PlanError::UnresolvedInput { ref variable, .. } if variable == "residuals"));
    }

    #[test]
    fn test_parse_rejects_tier_overflow() {
        let err = Plan::parse(
            Tier::Single,
            "planner_preprocessing_agent -> planner_data_viz_agent",
            CHAIN_INSTRUCTIONS,
        )
        .unwrap_err();
        assert!(matches!(err, PlanError::TooManyAgents { max: 1, count: 2, .. }));
    }

    #[test]
    fn test_parse_errors_are_tagged() {
        assert_eq!(Plan::parse(Tier::Two, "", "{}").unwrap_err(), PlanError::EmptyPlan);
        assert_eq!(
            Plan::parse(Tier::Two, "data_viz_agent", "no json").unwrap_err(),
            PlanError::NoInstructionObject
        );
        assert!(matches!(
            Plan::parse(Tier::Two, "data_viz_agent", "{not json}").unwrap_err(),
            PlanError::InvalidJson(_)
        ));
        assert!(matches!(
            Plan::parse(Tier::Two, "data_viz_agent", r#"{"data_viz_agent": {"create": [], "use": ["df"]}}"#)
                .unwrap_err(),
            PlanError::MissingField { field: "instruction", .. }
        ));
        assert!(matches!(
            Plan::parse(Tier::Two, "data_viz_agent", r#"{"other_agent": {"create": [], "use": [], "instruction": "x"}}"#)
                .unwrap_err(),
            PlanError::MissingInstruction { .. }
        ));
    }

    #[test]
    fn test_single_agent_without_separator() {
        let plan = Plan::parse(
            Tier::Single,
            "Plan: planner_data_viz_agent\n\nThe chart needs only one agent.",
            r#"Here you go: {"planner_data_viz_agent": {"create": "bar_chart", "use": "df", "instruction": "bar chart"}}"#,
        )
        .unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan.steps[0].agent, AgentKind::DataViz);
        assert_eq!(plan.steps[0].instruction.uses, vec!["df"]);
    }

    #[test]
    fn test_variable_names() {
        let entries = vec![
            "cleaned_df (pandas DataFrame)".to_string(),
            "metrics, predictions".to_string(),
            "`model`".to_string(),
            "42".to_string(),
        ];
        assert_eq!(variable_names(&entries), vec!["cleaned_df", "metrics", "predictions", "model"]);
    }

    #[test]
    fn test_first_known_agent() {
        assert_eq!(
            first_known_agent("I would use planner_sk_learn_agent, then plot"),
            Some(AgentKind::SkLearn)
        );
        assert_eq!(first_known_agent("no agents here"), None);
    }

    #[test]
    fn test_schema_mentions_use_field() {
        let schema = PlanInstruction::schema_json();
        assert!(schema.contains("\"use\""));
        assert!(schema.contains("\"create\""));
    }
}

//! Agent Registry
//!
//! Static catalog of analysis agents and the capability table that turns an
//! [`AgentKind`] into a structured model call.

use serde::Serialize;
use tracing::debug;

use super::signature::{FieldSpec, LanguageModel, Signature};
use super::{AgentKind, AgentResult};
use crate::utils::code::strip_code_fences;

/// Styling guidance passed to the visualization agent.
pub const DEFAULT_STYLING: &str =
    "Default styling with clear labels and colors. Use a white template, readable axis titles, \
     and a title that states what the chart shows.";

/// One catalog entry. Created once, never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct AgentDescriptor {
    pub kind: AgentKind,
    pub capability: &'static str,
    /// Variables the agent typically reads.
    pub reads: &'static [&'static str],
    /// Variables the agent typically writes.
    pub writes: &'static [&'static str],
}

static CATALOG: [AgentDescriptor; 5] = [
    AgentDescriptor {
        kind: AgentKind::Preprocessing,
        capability: "Cleans and prepares a DataFrame using Pandas and NumPy, handles missing values, \
                     detects column types, and converts date strings to datetime. Outputs a cleaned \
                     DataFrame for later agents.",
        reads: &["df"],
        writes: &["cleaned_data"],
    },
    AgentDescriptor {
        kind: AgentKind::StatisticalAnalytics,
        capability: "Performs statistical analysis (regression, correlation, seasonal decomposition) \
                     using statsmodels with proper handling of categorical data and missing values. \
                     Produces summary statistics and model diagnostics.",
        reads: &["df", "cleaned_data"],
        writes: &["summary_statistics", "correlation_matrix"],
    },
    AgentDescriptor {
        kind: AgentKind::SkLearn,
        capability: "Trains and evaluates machine learning models with scikit-learn (classification, \
                     regression, clustering) and reports performance metrics and feature importance.",
        reads: &["df", "cleaned_data"],
        writes: &["trained_model", "model_metrics", "predictions"],
    },
    AgentDescriptor {
        kind: AgentKind::DataViz,
        capability: "Creates interactive Plotly visualizations, selecting the chart type that best \
                     reveals trends, comparisons and model results, and annotates key insights.",
        reads: &["df", "cleaned_data", "predictions"],
        writes: &["visualization"],
    },
    AgentDescriptor {
        kind: AgentKind::WebSearch,
        capability: "Gathers background information and domain context that helps interpret the \
                     dataset and the analysis results.",
        reads: &[],
        writes: &["research_notes"],
    },
];

/// What an agent receives for one plan step.
#[derive(Debug, Clone, Copy)]
pub struct AgentRequest<'a> {
    pub goal: &'a str,
    pub dataset: &'a str,
    /// The step's plan instruction as JSON.
    pub instruction: &'a str,
    /// Summaries produced by earlier agents in the same turn.
    pub prior_results: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentOutput {
    pub code: String,
    pub summary: String,
}

impl AgentOutput {
    /// Result of the generic handler used for unrecognized agent names.
    pub fn placeholder(name: &str) -> Self {
        Self {
            code: format!("# {} execution\nprint('Agent {} completed')", name, name),
            summary: format!("Agent {} executed with generic handler", name),
        }
    }
}

fn code_agent(kind: &AgentKind) -> Signature {
    Signature::new("code_agent", kind.instructions())
        .input(FieldSpec::required("goal", "The user's analysis goal"))
        .input(FieldSpec::required("dataset", "Profile of the dataset loaded as `df`"))
        .input(FieldSpec::required(
            "plan_instructions",
            "JSON with the variables to create, the variables to use, and the instruction to follow",
        ))
        .input(FieldSpec::optional("prior_results", "Summaries from agents that already ran"))
        .output(FieldSpec::required("code", "Python code that performs the step"))
        .output(FieldSpec::optional("summary", "A short summary of what the code does and finds"))
}

fn viz_agent(kind: &AgentKind) -> Signature {
    code_agent(kind).input(FieldSpec::required("styling_index", "Styling guidance for Plotly figures"))
}

fn research_agent(kind: &AgentKind) -> Signature {
    Signature::new("research_agent", kind.instructions())
        .input(FieldSpec::required("goal", "The user's analysis goal"))
        .input(FieldSpec::required("dataset", "Profile of the dataset loaded as `df`"))
        .input(FieldSpec::required("plan_instructions", "Step instruction as JSON"))
        .output(FieldSpec::required("summary", "Findings relevant to the goal"))
        .output(FieldSpec::optional("code", "Optional supporting Python code"))
}

type Capability = fn(&AgentKind) -> Signature;

/// Capability table. `None` routes to the generic placeholder handler.
fn capability(kind: &AgentKind) -> Option<Capability> {
    match kind {
        AgentKind::Preprocessing | AgentKind::StatisticalAnalytics | AgentKind::SkLearn => Some(code_agent),
        AgentKind::DataViz => Some(viz_agent),
        AgentKind::WebSearch => Some(research_agent),
        AgentKind::Unknown(_) => None,
    }
}

/// Read-only catalog plus the model used to run agent capabilities.
#[derive(Clone)]
pub struct AgentRegistry {
    lm: LanguageModel,
}

impl AgentRegistry {
    pub fn new(lm: LanguageModel) -> Self {
        Self { lm }
    }

    pub fn catalog() -> &'static [AgentDescriptor] {
        &CATALOG
    }

    pub fn descriptor(kind: &AgentKind) -> Option<&'static AgentDescriptor> {
        CATALOG.iter().find(|d| &d.kind == kind)
    }

    /// Catalog text for the planner prompt, using planner names.
    pub fn describe_for_planner() -> String {
        CATALOG
            .iter()
            .map(|d| {
                format!(
                    "- {}: {} (typically reads: {}; writes: {})",
                    d.kind.planner_name(),
                    d.capability,
                    if d.reads.is_empty() { "nothing".to_string() } else { d.reads.join(", ") },
                    d.writes.join(", ")
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub async fn invoke(&self, kind: &AgentKind, request: &AgentRequest<'_>) -> AgentResult<AgentOutput> {
        let Some(build) = capability(kind) else {
            debug!("No capability for '{}', using generic handler", kind);
            return Ok(AgentOutput::placeholder(kind.name()));
        };

        let mut values = vec![
            ("goal", request.goal),
            ("dataset", request.dataset),
            ("plan_instructions", request.instruction),
            ("prior_results", request.prior_results),
        ];
        if *kind == AgentKind::DataViz {
            values.push(("styling_index", DEFAULT_STYLING));
        }

        let fields = self.lm.complete(&build(kind), &values).await?;
        Ok(AgentOutput {
            code: strip_code_fences(fields.get("code").unwrap_or("")),
            summary: fields.get("summary").unwrap_or("").trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::LLMProvider;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FencedCodeProvider {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LLMProvider for FencedCodeProvider {
        async fn generate(&self, _model: &str, prompt: String, _system: Option<String>) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(prompt.contains("[[ ## plan_instructions ## ]]"));
            Ok("[[ ## code ## ]]\n```python\nfig = px.bar(df)\n```\n[[ ## summary ## ]]\nBar chart.\n[[ ## completed ## ]]".into())
        }
    }

    #[test]
    fn test_catalog_covers_known_kinds() {
        for kind in AgentKind::KNOWN.iter() {
            assert!(AgentRegistry::descriptor(kind).is_some(), "{} missing", kind);
        }
        let text = AgentRegistry::describe_for_planner();
        assert!(text.contains("planner_data_viz_agent"));
    }

    #[tokio::test]
    async fn test_unknown_agent_uses_placeholder_without_model() {
        let provider = Arc::new(FencedCodeProvider { calls: AtomicUsize::new(0) });
        let registry = AgentRegistry::new(LanguageModel::new(provider.clone(), "m"));
        let request = AgentRequest { goal: "g", dataset: "d", instruction: "{}", prior_results: "" };

        let out = registry.invoke(&AgentKind::from_name("mystery_agent"), &request).await.unwrap();
        assert_eq!(out.summary, "Agent mystery_agent executed with generic handler");
        assert!(out.code.starts_with("# mystery_agent execution"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_known_agent_strips_fences() {
        let provider = Arc::new(FencedCodeProvider { calls: AtomicUsize::new(0) });
        let registry = AgentRegistry::new(LanguageModel::new(provider.clone(), "m"));
        let request = AgentRequest { goal: "bar chart", dataset: "d", instruction: "{}", prior_results: "" };

        let out = registry.invoke(&AgentKind::DataViz, &request).await.unwrap();
        assert_eq!(out.code, "fig = px.bar(df)");
        assert_eq!(out.summary, "Bar chart.");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }
}

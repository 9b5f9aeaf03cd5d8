//! Story teller
//!
//! Turns the agents' separate summaries into one account of the analysis.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::executor::ExecutionResult;
use crate::agent::{FieldSpec, LanguageModel, Signature};

const STORY_ROLE: &str =
    "You are a data analysis storyteller. Combine the summaries written by several analysis \
     agents into one coherent narrative for the user: what was done, in order, and what was \
     found. Keep the numbers the agents reported and do not invent results.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrativeOrigin {
    /// Written by the model
    Told,
    /// Agent summaries listed as they are
    Listed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Narrative {
    pub text: String,
    pub origin: NarrativeOrigin,
}

#[derive(Clone)]
pub struct StoryTeller {
    lm: LanguageModel,
}

impl StoryTeller {
    pub fn new(lm: LanguageModel) -> Self {
        Self { lm }
    }

    /// `None` when no agent produced a summary. A single summary is used as is;
    /// several go through the model, falling back to a plain list.
    pub async fn tell(&self, goal: &str, results: &[ExecutionResult]) -> Option<Narrative> {
        let summaries: Vec<(&str, &str)> = results
            .iter()
            .filter(|r| r.is_ok() && !r.summary.trim().is_empty())
            .map(|r| (r.agent.as_str(), r.summary.trim()))
            .collect();

        match summaries.as_slice() {
            [] => None,
            [(_, only)] => Some(Narrative {
                text: only.to_string(),
                origin: NarrativeOrigin::Listed,
            }),
            many => {
                let listing = many
                    .iter()
                    .map(|(agent, summary)| format!("{}: {}", agent, summary))
                    .collect::<Vec<_>>()
                    .join("\n");
                let signature = Signature::new("story_teller", STORY_ROLE)
                    .input(FieldSpec::required("goal", "The user's analysis goal"))
                    .input(FieldSpec::required("agent_summaries", "Each agent's summary, in plan order"))
                    .output(FieldSpec::required("story", "One narrative covering every agent's work"));

                match self
                    .lm
                    .complete(&signature, &[("goal", goal), ("agent_summaries", listing.as_str())])
                    .await
                {
                    Ok(fields) => {
                        debug!("Narrative written from {} summaries", many.len());
                        Some(Narrative {
                            text: fields.get("story").unwrap_or_default().to_string(),
                            origin: NarrativeOrigin::Told,
                        })
                    }
                    Err(e) => {
                        warn!("Story teller failed ({}), listing summaries", e);
                        Some(Narrative {
                            text: many
                                .iter()
                                .map(|(agent, summary)| format!("- **{}**: {}", agent, summary))
                                .collect::<Vec<_>>()
                                .join("\n"),
                            origin: NarrativeOrigin::Listed,
                        })
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::LLMProvider;
    use crate::orchestrator::executor::ExecutionStatus;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Scripted {
        reply: Option<&'static str>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LLMProvider for Scripted {
        async fn generate(&self, _model: &str, _prompt: String, _system: Option<String>) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.map(str::to_string).ok_or_else(|| anyhow::anyhow!("unavailable"))
        }
    }

    fn teller(reply: Option<&'static str>) -> (StoryTeller, Arc<Scripted>) {
        let provider = Arc::new(Scripted { reply, calls: AtomicUsize::new(0) });
        (StoryTeller::new(LanguageModel::new(provider.clone(), "m")), provider)
    }

    fn result(agent: &str, summary: &str, ok: bool) -> ExecutionResult {
        ExecutionResult {
            agent: agent.to_string(),
            kind: if ok { "statistical_analysis" } else { "error" }.to_string(),
            code: String::new(),
            summary: summary.to_string(),
            status: if ok { ExecutionStatus::Ok } else { ExecutionStatus::Error },
            error: (!ok).then(|| "failed".to_string()),
        }
    }

    #[tokio::test]
    async fn test_single_summary_skips_model() {
        let (teller, provider) = teller(Some("unused"));
        let story = teller
            .tell("g", &[result("a", "Mean price is 12.", true), result("b", "", false)])
            .await
            .unwrap();

        assert_eq!(story.text, "Mean price is 12.");
        assert_eq!(story.origin, NarrativeOrigin::Listed);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_several_summaries_are_told() {
        let (teller, _) = teller(Some("[[ ## story ## ]]\nPrices were cleaned, then modeled."));
        let story = teller
            .tell("g", &[result("a", "Cleaned.", true), result("b", "R^2 0.8.", true)])
            .await
            .unwrap();

        assert_eq!(story.origin, NarrativeOrigin::Told);
        assert_eq!(story.text, "Prices were cleaned, then modeled.");
    }

    #[tokio::test]
    async fn test_model_failure_lists_summaries() {
        let (teller, _) = teller(None);
        let story = teller
            .tell("g", &[result("a", "Cleaned.", true), result("b", "R^2 0.8.", true)])
            .await
            .unwrap();

        assert_eq!(story.origin, NarrativeOrigin::Listed);
        assert_eq!(story.text, "- **a**: Cleaned.\n- **b**: R^2 0.8.");
    }

    #[tokio::test]
    async fn test_no_summaries() {
        let (teller, provider) = teller(Some("unused"));
        assert!(teller.tell("g", &[result("a", "", false)]).await.is_none());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }
}

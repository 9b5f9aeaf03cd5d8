//! Integrator - Code combination and repair
//!
//! Merges per-agent fragments into one script and patches that script when it
//! fails to run.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::executor::ExecutionResult;
use crate::agent::{AgentResult, FieldSpec, LanguageModel, Signature};
use crate::utils::code::{assigns, strip_code_fences};

/// Statement that isolates each script from the caller's dataset.
pub const DATASET_COPY: &str = "df = df.copy()";

const COMBINER_ROLE: &str =
    "You are a code combiner. Merge the Python fragments written by several analysis agents into \
     one script that runs top to bottom against `df`. Resolve variable name collisions and type \
     mismatches using the dataset profile, remove duplicate imports and redundant loading, keep \
     every analysis step, and make sure every Plotly figure is shown with `fig.show()`.";

const REPAIR_ROLE: &str =
    "You fix Python data-analysis code. Make the smallest change that resolves the error using the \
     dataset profile. Do not alter logic that is unrelated to the failure. Return the complete fixed script.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeFragment {
    pub agent: String,
    pub code: String,
}

impl CodeFragment {
    /// Fragments from successful results that produced code.
    pub fn from_results(results: &[ExecutionResult]) -> Vec<Self> {
        results
            .iter()
            .filter(|r| r.is_ok() && !r.code.trim().is_empty())
            .map(|r| CodeFragment {
                agent: r.agent.clone(),
                code: r.code.clone(),
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombineOrigin {
    Empty,
    Single,
    /// Merged by the model.
    Merged,
    /// Model merge failed; fragments joined in plan order.
    Concatenated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombinedCode {
    pub code: String,
    pub summary: String,
    pub origin: CombineOrigin,
}

#[derive(Clone)]
pub struct Integrator {
    lm: LanguageModel,
    /// Whether scripts run with `df` bound
    dataset_bound: bool,
}

impl Integrator {
    pub fn new(lm: LanguageModel) -> Self {
        Self { lm, dataset_bound: true }
    }

    /// Without a bound dataset, combined scripts do not copy `df`.
    pub fn with_dataset_bound(mut self, bound: bool) -> Self {
        self.dataset_bound = bound;
        self
    }

    pub async fn combine(&self, dataset: &str, fragments: &[CodeFragment]) -> CombinedCode {
        match fragments {
            [] => CombinedCode {
                code: String::new(),
                summary: "No agent produced code.".to_string(),
                origin: CombineOrigin::Empty,
            },
            [only] => CombinedCode {
                code: normalize(&only.code, self.dataset_bound),
                summary: format!("Code from {}.", only.agent),
                origin: CombineOrigin::Single,
            },
            many => {
                let listing = render_fragments(many);
                let signature = Signature::new("code_combiner", COMBINER_ROLE)
                    .input(FieldSpec::required("dataset", "Profile of the dataset loaded as `df`"))
                    .input(FieldSpec::required("agent_code_list", "Code written by each agent, in plan order"))
                    .output(FieldSpec::required("refined_complete_code", "The combined, runnable script"))
                    .output(FieldSpec::optional("summary", "What the combined script does"));

                match self
                    .lm
                    .complete(&signature, &[("dataset", dataset), ("agent_code_list", listing.as_str())])
                    .await
                {
                    Ok(fields) => {
                        info!("Combined {} fragments", many.len());
                        CombinedCode {
                            code: normalize(fields.get("refined_complete_code").unwrap_or_default(), self.dataset_bound),
                            summary: fields.get("summary").unwrap_or_default().to_string(),
                            origin: CombineOrigin::Merged,
                        }
                    }
                    Err(e) => {
                        warn!("Code combination failed ({}), concatenating fragments", e);
                        CombinedCode {
                            code: normalize(&concatenate(many), self.dataset_bound),
                            summary: format!("Concatenated code from {} agents.", many.len()),
                            origin: CombineOrigin::Concatenated,
                        }
                    }
                }
            }
        }
    }

    /// One surgical fix of `faulty` given the error it produced.
    ///
    /// The fixed script is kept as written apart from fence stripping and
    /// figure rendering; lines the fix removed are not added back.
    pub async fn repair(&self, dataset: &str, faulty: &str, error: &str) -> AgentResult<String> {
        let signature = Signature::new("code_fix", REPAIR_ROLE)
            .input(FieldSpec::required("dataset_context", "Profile of the dataset loaded as `df`"))
            .input(FieldSpec::required("faulty_code", "The script that failed"))
            .input(FieldSpec::required("error", "The error message it raised"))
            .output(FieldSpec::required("fixed_code", "The complete fixed script"));

        let fields = self
            .lm
            .complete(
                &signature,
                &[("dataset_context", dataset), ("faulty_code", faulty), ("error", error)],
            )
            .await?;
        Ok(normalize(fields.require("fixed_code")?, false))
    }
}

/// Fence stripping and explicit figure rendering. `copy_dataset` prepends
/// [`DATASET_COPY`] unless the script already has it.
pub fn normalize(code: &str, copy_dataset: bool) -> String {
    let code = strip_code_fences(code);
    if code.is_empty() {
        return code;
    }

    let mut out = if !copy_dataset || code.lines().any(|l| l.trim() == DATASET_COPY) {
        code
    } else {
        format!("{}\n{}", DATASET_COPY, code)
    };

    if assigns(&out, "fig") && !out.contains("fig.show(") {
        out.push_str("\nfig.show()");
    }
    out
}

/// Deterministic join of fragments in plan order.
pub fn concatenate(fragments: &[CodeFragment]) -> String {
    fragments
        .iter()
        .map(|f| format!("# --- {} ---\n{}", f.agent, strip_code_fences(&f.code)))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_fragments(fragments: &[CodeFragment]) -> String {
    fragments
        .iter()
        .enumerate()
        .map(|(i, f)| format!("## {}. {}\n```python\n{}\n```", i + 1, f.agent, f.code.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentError, LLMProvider};
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

    fn integrator(reply: Option<&'static str>) -> (Integrator, Arc<Scripted>) {
        let provider = Arc::new(Scripted { reply, calls: AtomicUsize::new(0) });
        (Integrator::new(LanguageModel::new(provider.clone(), "m")), provider)
    }

    fn fragment(agent: &str, code: &str) -> CodeFragment {
        CodeFragment { agent: agent.to_string(), code: code.to_string() }
    }

    #[test]
    fn test_normalize() {
        let out = normalize("```python\nimport plotly.express as px\nfig = px.bar(df)\n```", true);
        assert!(out.starts_with(DATASET_COPY));
        assert!(out.ends_with("fig.show()"));

        let shown = normalize("df = df.copy()\nfig = px.line(df)\nfig.show()", true);
        assert_eq!(shown.matches("fig.show()").count(), 1);
        assert_eq!(shown.matches(DATASET_COPY).count(), 1);

        assert_eq!(normalize("  ", true), "");
    }

    #[test]
    fn test_normalize_without_dataset_leaves_df_alone() {
        let out = normalize("import numpy as np\nfig = px.line(y=np.sin(np.arange(10)))", false);
        assert!(!out.contains(DATASET_COPY));
        assert!(out.ends_with("fig.show()"));
    }

    #[tokio::test]
    async fn test_unbound_dataset_combines_without_copy() {
        let (integrator, _) = integrator(None);
        let integrator = integrator.with_dataset_bound(false);
        let combined = integrator
            .combine("no dataset", &[fragment("a", "x = 1"), fragment("b", "print(x)")])
            .await;
        assert!(!combined.code.contains(DATASET_COPY));
    }

    #[tokio::test]
    async fn test_single_fragment_skips_model() {
        let (integrator, provider) = integrator(Some("unused"));
        let combined = integrator.combine("df", &[fragment("data_viz_agent", "fig = px.bar(df)")]).await;

        assert_eq!(combined.origin, CombineOrigin::Single);
        assert!(combined.code.contains("fig.show()"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_merge_uses_model_output() {
        let reply = "[[ ## refined_complete_code ## ]]\n```python\nclean = df.dropna()\nprint(clean.shape)\n```\n[[ ## summary ## ]]\nMerged.";
        let (integrator, provider) = integrator(Some(reply));
        let combined = integrator
            .combine("df", &[fragment("a", "clean = df.dropna()"), fragment("b", "print(clean.shape)")])
            .await;

        assert_eq!(combined.origin, CombineOrigin::Merged);
        assert_eq!(combined.code, "df = df.copy()\nclean = df.dropna()\nprint(clean.shape)");
        assert_eq!(combined.summary, "Merged.");
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_merge_failure_concatenates() {
        let (integrator, _) = integrator(None);
        let combined = integrator
            .combine("df", &[fragment("a", "x = 1"), fragment("b", "y = x + 1")])
            .await;

        assert_eq!(combined.origin, CombineOrigin::Concatenated);
        let a = combined.code.find("# --- a ---").unwrap();
        let b = combined.code.find("# --- b ---").unwrap();
        assert!(a < b);
    }

    #[tokio::test]
    async fn test_repair_returns_fixed_code() {
        let (integrator, _) = integrator(Some("[[ ## fixed_code ## ]]\ndf['x'] = pd.to_numeric(df['x'])"));
        let fixed = integrator.repair("df", "df['x'].mean()", "TypeError").await.unwrap();
        assert!(fixed.contains("pd.to_numeric"));
    }

    #[tokio::test]
    async fn test_repair_does_not_restore_removed_copy() {
        let (integrator, _) = integrator(Some("[[ ## fixed_code ## ]]\nimport math\nprint(math.sin(1.0))"));
        let fixed = integrator
            .repair("no dataset", "df = df.copy()\nimport math\nprint(math.sin(1.0))", "NameError: name 'df' is not defined")
            .await
            .unwrap();
        assert_eq!(fixed, "import math\nprint(math.sin(1.0))");
    }

    #[tokio::test]
    async fn test_repair_surfaces_provider_error() {
        let (integrator, _) = integrator(None);
        let err = integrator.repair("df", "code", "err").await.unwrap_err();
        assert!(matches!(err, AgentError::Provider(_)));
    }
}

//! Python code runner
//!
//! Executes generated scripts in a separate interpreter process with the
//! dataset preloaded as `df`. Plotly figures are written to HTML files in the
//! artifact directory instead of opening a browser.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

use super::{CodeRunner, ExecutionOutcome};
use crate::agent::{AgentError, AgentResult};
use crate::orchestrator::DatasetDescriptor;
use crate::utils::truncate::truncate_middle;

const ARTIFACT_MARKER: &str = "__ARTIFACT__ ";

const FIGURE_CAPTURE: &str = r#"
try:
    import plotly.graph_objects as _go
    _figure_count = [0]
    def _capture_show(self, *args, **kwargs):
        _figure_count[0] += 1
        _target = os.path.join(_ARTIFACT_DIR, "figure_%d_%d.html" % (os.getpid(), _figure_count[0]))
        self.write_html(_target)
        print("__ARTIFACT__ " + _target)
    _go.Figure.show = _capture_show
except ImportError:
    pass
"#;

const PROFILE_SCRIPT: &str = r#"
print("Shape: %d rows x %d columns" % df.shape)
print("\nColumns and types:")
for _name, _dtype in df.dtypes.items():
    print("- %s: %s" % (_name, _dtype))
print("\nMissing values per column:")
print(df.isnull().sum().to_string())
print("\nFirst rows:")
print(df.head(5).to_string())
print("\nSummary statistics:")
print(df.describe(include="all").to_string())
"#;

pub struct PythonRunner {
    interpreter: String,
    /// Maximum execution time in seconds
    timeout_secs: u64,
    /// Maximum length kept from stdout and stderr
    max_output_len: usize,
    artifact_dir: PathBuf,
}

impl PythonRunner {
    pub fn new() -> Self {
        Self {
            interpreter: "python3".to_string(),
            timeout_secs: 120,
            max_output_len: 10_000,
            artifact_dir: std::env::temp_dir().join("analyst_agency_artifacts"),
        }
    }

    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Cap on the stdout and stderr kept from one run.
    pub fn with_max_output(mut self, len: usize) -> Self {
        self.max_output_len = len;
        self
    }

    pub fn with_artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = dir.into();
        self
    }

    /// Profiles a dataset file into a descriptor by loading it with pandas.
    pub async fn profile_dataset(&self, path: &Path) -> AgentResult<DatasetDescriptor> {
        if !path.exists() {
            return Err(AgentError::Validation(format!("dataset not found: {}", path.display())));
        }
        let script = format!("{}{}", self.prelude(Some(path)), PROFILE_SCRIPT);
        let run = self.run_script(&script).await?;
        if run.exit_code != 0 {
            return Err(AgentError::Execution(format!(
                "could not profile {}: {}",
                path.display(),
                last_lines(&run.stderr, 5)
            )));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(DatasetDescriptor::new(name, truncate_middle(&run.stdout, self.max_output_len)).with_source(path))
    }

    fn prelude(&self, dataset: Option<&Path>) -> String {
        let mut prelude = String::from("import os\nimport sys\n");
        prelude.push_str(&format!("_ARTIFACT_DIR = {}\n", py_string(&self.artifact_dir.to_string_lossy())));

        if let Some(path) = dataset {
            prelude.push_str("import pandas as pd\n");
            prelude.push_str(&format!("_DATASET = {}\n", py_string(&path.to_string_lossy())));
            prelude.push_str(
                "_ext = os.path.splitext(_DATASET)[1].lower()\n\
                 if _ext in ('.xlsx', '.xls'):\n    df = pd.read_excel(_DATASET)\n\
                 elif _ext == '.json':\n    df = pd.read_json(_DATASET)\n\
                 elif _ext == '.parquet':\n    df = pd.read_parquet(_DATASET)\n\
                 else:\n    df = pd.read_csv(_DATASET)\n",
            );
        }
        prelude
    }

    fn build_script(&self, code: &str, dataset: Option<&Path>) -> String {
        format!("{}{}\n# --- generated ---\n{}\n", self.prelude(dataset), FIGURE_CAPTURE, code)
    }

    async fn run_script(&self, script: &str) -> AgentResult<ScriptRun> {
        tokio::fs::create_dir_all(&self.artifact_dir).await?;

        let workdir = tempfile::tempdir()?;
        let script_path = workdir.path().join("analysis.py");
        tokio::fs::write(&script_path, script).await?;

        debug!("Running {} {}", self.interpreter, script_path.display());
        let result = timeout(
            Duration::from_secs(self.timeout_secs),
            Command::new(&self.interpreter)
                .arg(&script_path)
                .current_dir(workdir.path())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output(),
        )
        .await;

        match result {
            Ok(Ok(output)) => Ok(ScriptRun {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                exit_code: output.status.code().unwrap_or(-1),
            }),
            Ok(Err(e)) => Err(AgentError::Execution(format!("failed to start {}: {}", self.interpreter, e))),
            Err(_) => Ok(ScriptRun {
                stdout: String::new(),
                stderr: format!("Execution timed out after {} seconds", self.timeout_secs),
                exit_code: -1,
            }),
        }
    }
}

impl Default for PythonRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// Raw output of one run. Truncation happens after artifact markers are read.
struct ScriptRun {
    stdout: String,
    stderr: String,
    exit_code: i32,
}

impl ScriptRun {
    fn into_outcome(self, max_len: usize) -> ExecutionOutcome {
        let mut artifacts = Vec::new();
        let stdout = self
            .stdout
            .lines()
            .filter(|line| match line.strip_prefix(ARTIFACT_MARKER) {
                Some(path) => {
                    artifacts.push(PathBuf::from(path.trim()));
                    false
                }
                None => true,
            })
            .collect::<Vec<_>>()
            .join("\n");

        let error = (self.exit_code != 0).then(|| {
            if self.stderr.trim().is_empty() {
                format!("Process exited with code {}", self.exit_code)
            } else {
                truncate_middle(self.stderr.trim(), max_len)
            }
        });

        ExecutionOutcome {
            stdout: truncate_middle(&stdout, max_len),
            error,
            artifacts,
        }
    }
}

#[async_trait]
impl CodeRunner for PythonRunner {
    async fn execute(&self, code: &str, dataset: Option<&DatasetDescriptor>) -> AgentResult<ExecutionOutcome> {
        let path = dataset.and_then(|d| d.source.as_deref());
        if dataset.is_some() && path.is_none() {
            warn!("Dataset has no source file; running without `df`");
        }
        let outcome = self.run_script(&self.build_script(code, path)).await?.into_outcome(self.max_output_len);
        debug!(
            "Execution finished: success={}, artifacts={}",
            outcome.is_success(),
            outcome.artifacts.len()
        );
        Ok(outcome)
    }
}

/// Python string literal. JSON string escapes are valid Python escapes.
fn py_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("'{}'", s.replace('\'', "\\'")))
}

fn last_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.trim().lines().collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}

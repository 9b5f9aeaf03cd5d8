//! Configuration
//!
//! Values come from the environment (a `.env` file is honored by the binary),
//! each with a default.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::agent::{CachedProvider, LLMCache, LLMProvider, OllamaProvider, OpenAICompatibleProvider, TimeoutProvider};
use crate::tools::PythonRunner;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be {expected}, got '{value}'")]
    InvalidValue {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
    #[error("unknown provider '{0}', expected 'ollama' or 'openai'")]
    UnknownProvider(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Ollama,
    OpenAI,
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(ProviderKind::Ollama),
            "openai" | "openai_compatible" => Ok(ProviderKind::OpenAI),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalystConfig {
    pub provider: ProviderKind,
    pub model: String,
    pub ollama_host: String,
    pub ollama_port: u16,
    pub api_base: String,
    pub api_key: Option<String>,
    /// Bound on every model call
    pub llm_timeout_secs: u64,
    pub exec_timeout_secs: u64,
    pub python: String,
    pub artifact_dir: PathBuf,
    /// Console-only logging when unset
    pub log_dir: Option<PathBuf>,
    pub cache_enabled: bool,
    pub cache_capacity: usize,
    /// Past exchanges rendered into prompts
    pub history_window: usize,
}

impl Default for AnalystConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Ollama,
            model: "llama3.1:8b".to_string(),
            ollama_host: "http://localhost".to_string(),
            ollama_port: 11434,
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: None,
            llm_timeout_secs: 60,
            exec_timeout_secs: 120,
            python: "python3".to_string(),
            artifact_dir: PathBuf::from("artifacts"),
            log_dir: None,
            cache_enabled: true,
            cache_capacity: 512,
            history_window: 3,
        }
    }
}

impl AnalystConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        Ok(Self {
            provider: get("ANALYST_PROVIDER").map(|v| v.parse()).transpose()?.unwrap_or(defaults.provider),
            model: get("ANALYST_MODEL").unwrap_or(defaults.model),
            ollama_host: get("OLLAMA_HOST")
                .map(|v| parse_host("OLLAMA_HOST", v))
                .transpose()?
                .unwrap_or(defaults.ollama_host),
            ollama_port: parse_var(&get, "OLLAMA_PORT", "a port number")?.unwrap_or(defaults.ollama_port),
            api_base: get("ANALYST_API_BASE").unwrap_or(defaults.api_base),
            api_key: get("ANALYST_API_KEY").or_else(|| get("OPENAI_API_KEY")),
            llm_timeout_secs: parse_var(&get, "ANALYST_LLM_TIMEOUT_SECS", "a number of seconds")?
                .unwrap_or(defaults.llm_timeout_secs),
            exec_timeout_secs: parse_var(&get, "ANALYST_EXEC_TIMEOUT_SECS", "a number of seconds")?
                .unwrap_or(defaults.exec_timeout_secs),
            python: get("ANALYST_PYTHON").unwrap_or(defaults.python),
            artifact_dir: get("ANALYST_ARTIFACT_DIR").map(PathBuf::from).unwrap_or(defaults.artifact_dir),
            log_dir: get("ANALYST_LOG_DIR").map(PathBuf::from),
            cache_enabled: get("ANALYST_CACHE")
                .map(|v| parse_bool("ANALYST_CACHE", &v))
                .transpose()?
                .unwrap_or(defaults.cache_enabled),
            cache_capacity: parse_var(&get, "ANALYST_CACHE_CAPACITY", "a positive integer")?
                .unwrap_or(defaults.cache_capacity),
            history_window: parse_var(&get, "ANALYST_HISTORY_WINDOW", "a non-negative integer")?
                .unwrap_or(defaults.history_window),
        })
    }

    /// Concrete provider, optionally cached, always time-bounded.
    pub fn build_provider(&self) -> Arc<dyn LLMProvider> {
        let base: Arc<dyn LLMProvider> = match self.provider {
            ProviderKind::Ollama => Arc::new(OllamaProvider::new(ollama_rs::Ollama::new(
                self.ollama_host.clone(),
                self.ollama_port,
            ))),
            ProviderKind::OpenAI => Arc::new(OpenAICompatibleProvider::new(self.api_base.clone(), self.api_key.clone())),
        };

        let cached: Arc<dyn LLMProvider> = if self.cache_enabled {
            Arc::new(CachedProvider::new(base, Arc::new(LLMCache::new(self.cache_capacity))))
        } else {
            base
        };

        Arc::new(TimeoutProvider::new(cached, Duration::from_secs(self.llm_timeout_secs)))
    }

    pub fn build_runner(&self) -> PythonRunner {
        PythonRunner::new()
            .with_interpreter(self.python.clone())
            .with_timeout(self.exec_timeout_secs)
            .with_artifact_dir(self.artifact_dir.clone())
    }
}

fn parse_var<T, G>(get: &G, var: &'static str, expected: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    get(var)
        .map(|value| {
            value
                .parse::<T>()
                .map_err(|_| ConfigError::InvalidValue { var, expected, value: value.clone() })
        })
        .transpose()
}

/// An absolute http(s) URL with a host, the form the Ollama client accepts.
fn parse_host(var: &'static str, value: String) -> Result<String, ConfigError> {
    match reqwest::Url::parse(&value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && url.host().is_some() => Ok(value),
        _ => Err(ConfigError::InvalidValue {
            var,
            expected: "an http(s) URL",
            value,
        }),
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            var,
            expected: "a boolean",
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<AnalystConfig, ConfigError> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        AnalystConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        assert_eq!(config(&[]).unwrap(), AnalystConfig::default());
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[
            ("ANALYST_PROVIDER", "openai"),
            ("ANALYST_MODEL", "gpt-4o-mini"),
            ("ANALYST_LLM_TIMEOUT_SECS", "15"),
            ("ANALYST_CACHE", "off"),
            ("ANALYST_LOG_DIR", "/var/log/analyst"),
            ("OPENAI_API_KEY", "sk-test"),
        ])
        .unwrap();

        assert_eq!(cfg.provider, ProviderKind::OpenAI);
        assert_eq!(cfg.model, "gpt-4o-mini");
        assert_eq!(cfg.llm_timeout_secs, 15);
        assert!(!cfg.cache_enabled);
        assert_eq!(cfg.log_dir, Some(PathBuf::from("/var/log/analyst")));
        assert_eq!(cfg.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_blank_values_fall_back() {
        let cfg = config(&[("ANALYST_MODEL", "   ")]).unwrap();
        assert_eq!(cfg.model, AnalystConfig::default().model);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            config(&[("ANALYST_LLM_TIMEOUT_SECS", "soon")]),
            Err(ConfigError::InvalidValue { var: "ANALYST_LLM_TIMEOUT_SECS", .. })
        ));
        assert_eq!(
            config(&[("ANALYST_PROVIDER", "bard")]).unwrap_err(),
            ConfigError::UnknownProvider("bard".to_string())
        );
        assert!(config(&[("ANALYST_CACHE", "maybe")]).is_err());
        assert_eq!(
            config(&[("OLLAMA_HOST", "not a url")]).unwrap_err(),
            ConfigError::InvalidValue {
                var: "OLLAMA_HOST",
                expected: "an http(s) URL",
                value: "not a url".to_string(),
            }
        );
        assert!(config(&[("OLLAMA_HOST", "localhost:11434")]).is_err());
    }

    #[test]
    fn test_valid_ollama_host_builds_provider() {
        let cfg = config(&[("OLLAMA_HOST", "http://10.0.0.5")]).unwrap();
        assert_eq!(cfg.ollama_host, "http://10.0.0.5");
        let _provider = cfg.build_provider();
    }
}

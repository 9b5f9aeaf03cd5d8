//! Router - Conversational vs analytical classification
//!
//! A lexical gate in front of the planner. It never fails; ambiguous goals get
//! a best-effort decision with a lower confidence.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::info;

use super::keywords::{self, ANALYTICAL};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnMode {
    Conversational,
    Analytical,
}

impl fmt::Display for TurnMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnMode::Conversational => write!(f, "conversational"),
            TurnMode::Analytical => write!(f, "analytical"),
        }
    }
}

/// Routing decision for a goal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub mode: TurnMode,
    /// Confidence in the decision (0.0 - 1.0), for observability only
    pub confidence: f32,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct Router {
    vocabulary: Vec<String>,
}

impl Router {
    pub fn new() -> Self {
        Self {
            vocabulary: ANALYTICAL.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Extend the analytical vocabulary.
    pub fn with_keywords<I, S>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.vocabulary.extend(extra.into_iter().map(Into::into));
        self
    }

    pub fn route(&self, goal: &str, has_dataset_context: bool) -> RoutingDecision {
        let vocabulary: Vec<&str> = self.vocabulary.iter().map(String::as_str).collect();
        let decision = match keywords::first_match(goal, &vocabulary) {
            Some(word) => RoutingDecision {
                mode: TurnMode::Analytical,
                confidence: 0.8,
                reason: format!("goal mentions analysis vocabulary ('{}')", word),
            },
            None if has_dataset_context => RoutingDecision {
                mode: TurnMode::Analytical,
                confidence: 0.6,
                reason: "a dataset is loaded for this session".to_string(),
            },
            None => RoutingDecision {
                mode: TurnMode::Conversational,
                confidence: 0.6,
                reason: "no analysis vocabulary and no dataset".to_string(),
            },
        };

        info!(
            "Routed to {} (confidence {:.1}): {}",
            decision.mode, decision.confidence, decision.reason
        );
        decision
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

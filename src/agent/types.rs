use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix the planner prompt uses for agent names.
pub const PLANNER_PREFIX: &str = "planner_";

/// The closed set of analysis agents.
///
/// Names the catalog does not know resolve to [`AgentKind::Unknown`], which is
/// executed by a placeholder handler instead of failing the turn.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AgentKind {
    Preprocessing,
    StatisticalAnalytics,
    SkLearn,
    DataViz,
    WebSearch,
    Unknown(String),
}

impl AgentKind {
    pub const KNOWN: [AgentKind; 5] = [
        AgentKind::Preprocessing,
        AgentKind::StatisticalAnalytics,
        AgentKind::SkLearn,
        AgentKind::DataViz,
        AgentKind::WebSearch,
    ];

    /// Resolve a name as written by a model or a user.
    ///
    /// Case, the `planner_` prefix, the `_agent` suffix and surrounding
    /// quotes or backticks are ignored.
    pub fn from_name(raw: &str) -> Self {
        let cleaned = raw
            .trim()
            .trim_matches(|c: char| !(c.is_alphanumeric() || c == '_'))
            .to_lowercase();
        let base = cleaned.strip_prefix(PLANNER_PREFIX).unwrap_or(&cleaned);
        let base = base.strip_suffix("_agent").unwrap_or(base);

        match base {
            "preprocessing" | "data_preprocessing" => AgentKind::Preprocessing,
            "statistical_analytics" | "statistical" | "statistics" => AgentKind::StatisticalAnalytics,
            "sk_learn" | "sklearn" | "ml" | "machine_learning" => AgentKind::SkLearn,
            "data_viz" | "visualization" | "viz" => AgentKind::DataViz,
            "web_search" => AgentKind::WebSearch,
            _ => AgentKind::Unknown(cleaned),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            AgentKind::Preprocessing => "preprocessing_agent",
            AgentKind::StatisticalAnalytics => "statistical_analytics_agent",
            AgentKind::SkLearn => "sk_learn_agent",
            AgentKind::DataViz => "data_viz_agent",
            AgentKind::WebSearch => "web_search_agent",
            AgentKind::Unknown(name) => name,
        }
    }

    pub fn planner_name(&self) -> String {
        format!("{}{}", PLANNER_PREFIX, self.name())
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, AgentKind::Unknown(_))
    }

    /// Label attached to this agent's results.
    pub fn result_label(&self) -> &'static str {
        match self {
            AgentKind::Preprocessing => "preprocessing",
            AgentKind::StatisticalAnalytics => "statistical_analysis",
            AgentKind::SkLearn => "machine_learning",
            AgentKind::DataViz => "visualization",
            AgentKind::WebSearch => "web_search",
            AgentKind::Unknown(_) => "generic",
        }
    }

    /// Role description handed to the model for this agent.
    pub fn instructions(&self) -> &'static str {
        match self {
            AgentKind::Preprocessing =>
                "You are a data preprocessing agent. Write pandas/numpy code that cleans and prepares \
                 the dataset `df`: handle missing values, fix dtypes, convert dates, and remove \
                 duplicates where the instruction asks for it. Work on a copy of `df`. Only create \
                 the variables listed under 'create' and only read the variables listed under 'use'.",
            AgentKind::StatisticalAnalytics =>
                "You are a statistical analytics agent. Write Python code using pandas, numpy and \
                 statsmodels that performs the requested statistical analysis: descriptive statistics, \
                 correlations, hypothesis tests or regressions. Print the key numbers you compute. \
                 Only create the variables listed under 'create' and only read the variables listed under 'use'.",
            AgentKind::SkLearn =>
                "You are a machine learning agent. Write scikit-learn code that trains, evaluates or \
                 applies models as instructed: split the data, fit the model, report metrics and keep \
                 predictions. Only create the variables listed under 'create' and only read the \
                 variables listed under 'use'.",
            AgentKind::DataViz =>
                "You are a data visualization agent. Write Plotly code that builds the requested chart \
                 from the listed variables, assigns it to `fig`, applies the styling guidance, and \
                 calls `fig.show()`. Only create the variables listed under 'create' and only read \
                 the variables listed under 'use'.",
            AgentKind::WebSearch =>
                "You are a research agent. Summarize background knowledge relevant to the goal that \
                 helps interpret the dataset. Return code only if it is genuinely needed.",
            AgentKind::Unknown(_) => "",
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<String> for AgentKind {
    fn from(name: String) -> Self {
        AgentKind::from_name(&name)
    }
}

impl From<AgentKind> for String {
    fn from(kind: AgentKind) -> Self {
        kind.name().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_resolution() {
        assert_eq!(AgentKind::from_name("planner_data_viz_agent"), AgentKind::DataViz);
        assert_eq!(AgentKind::from_name("`Preprocessing_Agent`"), AgentKind::Preprocessing);
        assert_eq!(AgentKind::from_name(" sk_learn "), AgentKind::SkLearn);
        assert_eq!(
            AgentKind::from_name("\"statistical_analytics_agent\","),
            AgentKind::StatisticalAnalytics
        );
    }

    #[test]
    fn test_unknown_keeps_cleaned_name() {
        let kind = AgentKind::from_name("Forecast_Agent");
        assert_eq!(kind, AgentKind::Unknown("forecast_agent".to_string()));
        assert!(!kind.is_known());
        assert_eq!(kind.result_label(), "generic");
    }

    #[test]
    fn test_serde_uses_names() {
        let json = serde_json::to_string(&AgentKind::DataViz).unwrap();
        assert_eq!(json, "\"data_viz_agent\"");
        let kind: AgentKind = serde_json::from_str("\"planner_web_search_agent\"").unwrap();
        assert_eq!(kind, AgentKind::WebSearch);
    }

    #[test]
    fn test_planner_name_round_trips() {
        for kind in AgentKind::KNOWN.iter() {
            assert_eq!(&AgentKind::from_name(&kind.planner_name()), kind);
        }
    }
}

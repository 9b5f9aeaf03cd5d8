//! Vocabulary tables shared by the router and the planner.

pub const ANALYTICAL: &[&str] = &[
    "analyze", "analysis", "data", "dataset", "csv", "plot", "chart", "graph", "visualize",
    "visualization", "statistics", "statistical", "correlation", "regression", "model", "predict",
    "prediction", "machine learning", "ml", "classification", "clustering", "preprocessing",
    "clean", "explore", "exploratory", "eda", "distribution", "trend", "pattern",
];

pub const MODELING: &[&str] = &[
    "model", "predict", "regression", "classification", "cluster", "machine learning", "ml",
];

pub const VISUALIZATION: &[&str] = &["plot", "chart", "visualize", "graph", "show"];

pub const CLEANING: &[&str] = &["clean", "preprocess"];

pub const STATISTICS: &[&str] = &[
    "eda", "exploratory", "analyze", "analysis", "statistics", "statistical", "correlation",
];

pub const PREPARATION: &[&str] = &["clean", "preprocess", "prepare", "missing values"];

pub const ML_FALLBACK: &[&str] = &[
    "model", "predict", "machine learning", "ml", "classification", "regression",
];

/// Case-insensitive match of any keyword at a word start.
///
/// `ml` matches "ml pipeline" but not "html".
pub fn mentions_any(text: &str, keywords: &[&str]) -> bool {
    let text = text.to_lowercase();
    keywords.iter().any(|k| mentions(&text, k))
}

/// First keyword found at a word start, in table order.
pub fn first_match<'k>(text: &str, keywords: &[&'k str]) -> Option<&'k str> {
    let text = text.to_lowercase();
    keywords.iter().copied().find(|k| mentions(&text, k))
}

fn mentions(lowered: &str, keyword: &str) -> bool {
    lowered.match_indices(keyword).any(|(idx, _)| {
        lowered[..idx]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric())
    })
}

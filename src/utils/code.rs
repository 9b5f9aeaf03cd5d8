//! Helpers for model-generated Python code.

/// Removes Markdown code fences around a snippet.
pub fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    if !trimmed.contains("```") {
        return trimmed.to_string();
    }

    trimmed
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// True when `code` assigns to `name` at the start of some line.
pub fn assigns(code: &str, name: &str) -> bool {
    code.lines().any(|line| {
        line.trim_start()
            .strip_prefix(name)
            .map(|rest| {
                let rest = rest.trim_start();
                rest.starts_with('=') && !rest.starts_with("==")
            })
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_fences() {
        assert_eq!(strip_code_fences("```python\nprint(1)\n```"), "print(1)");
        assert_eq!(strip_code_fences("```\nx = 1\ny = 2\n```\n"), "x = 1\ny = 2");
        assert_eq!(strip_code_fences("  plain  "), "plain");
    }

    #[test]
    fn test_assigns() {
        assert!(assigns("import plotly\nfig = px.bar(df)", "fig"));
        assert!(assigns("fig= 1", "fig"));
        assert!(!assigns("if fig == None: pass", "fig"));
        assert!(!assigns("figure = 1", "fig"));
    }
}

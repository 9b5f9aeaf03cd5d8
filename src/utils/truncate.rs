//! Truncation helpers
//!
//! All cuts land on UTF-8 boundaries.

/// Keeps the head and tail of `content` within `max_bytes`, marking the cut.
pub fn truncate_middle(content: &str, max_bytes: usize) -> String {
    if content.len() <= max_bytes {
        return content.to_string();
    }
    if max_bytes == 0 {
        return format!("... [{} bytes truncated] ...", content.len());
    }

    let half = max_bytes / 2;
    let head_end = floor_boundary(content, half);
    let tail_start = ceil_boundary(content, content.len() - half).max(head_end);

    format!(
        "{} ... [{} bytes truncated] ... {}",
        &content[..head_end],
        tail_start - head_end,
        &content[tail_start..]
    )
}

/// Single-line preview of at most `max_chars` characters, ending in `...` when cut.
pub fn preview(content: &str, max_chars: usize) -> String {
    let flat = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let kept: String = flat.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept.trim_end())
}

fn floor_boundary(s: &str, mut idx: usize) -> usize {
    idx = idx.min(s.len());
    while !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_boundary(s: &str, mut idx: usize) -> usize {
    while idx < s.len() && !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_untouched() {
        assert_eq!(truncate_middle("hello", 10), "hello");
        assert_eq!(preview("a  b\n c", 10), "a b c");
    }

    #[test]
    fn test_middle_cut_keeps_ends() {
        let out = truncate_middle("abcdefghijklmnopqrstuvwxyz", 10);
        assert!(out.starts_with("abcde"));
        assert!(out.ends_with("vwxyz"));
        assert!(out.contains("[16 bytes truncated]"));
    }

    #[test]
    fn test_multibyte_boundaries() {
        let text = "ééééééééééé";
        let out = truncate_middle(text, 5);
        assert!(out.contains("truncated"));
        let out = preview("日本語のテキストです", 6);
        assert_eq!(out, "日本語...");
    }
}

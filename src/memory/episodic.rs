//! Conversation history
//!
//! Ordered log of user goals and assistant responses for one session. Turns
//! are only appended; the log is dropped as a whole when a new dataset is
//! loaded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::truncate::preview;

/// Older user goals condensed into the summary line.
const MAX_EARLIER_GOALS: usize = 8;
const EARLIER_GOAL_CHARS: usize = 80;

/// A single conversation turn
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Which pipeline produced an assistant turn (`analytical`, `conversational`)
    pub agent: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ConversationHistory {
    turns: Vec<ConversationTurn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&mut self, content: impl Into<String>) {
        self.turns.push(ConversationTurn {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            agent: None,
        });
    }

    pub fn add_assistant(&mut self, content: impl Into<String>, agent: Option<String>) {
        self.turns.push(ConversationTurn {
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            agent,
        });
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last_user_message(&self) -> Option<&str> {
        self.turns
            .iter()
            .rev()
            .find(|t| t.role == Role::User)
            .map(|t| t.content.as_str())
    }

    /// The last `exchanges` user/assistant pairs as prompt context.
    ///
    /// Assistant replies are cut to `max_reply_chars`. Turns before the window
    /// are condensed into one line listing the earlier user goals.
    pub fn format_recent(&self, exchanges: usize, max_reply_chars: usize) -> String {
        let keep = exchanges.saturating_mul(2);
        let start = self.turns.len().saturating_sub(keep);

        let mut lines = Vec::new();
        if let Some(summary) = summarize_goals(&self.turns[..start]) {
            lines.push(summary);
        }
        lines.extend(self.turns[start..].iter().map(|turn| match turn.role {
            Role::User => format!("User: {}", turn.content.trim()),
            Role::Assistant => format!("Assistant: {}", preview(&turn.content, max_reply_chars)),
        }));
        lines.join("\n")
    }

    /// Full transcript, `User:`/`Assistant:` blocks.
    pub fn transcript(&self) -> String {
        self.turns
            .iter()
            .map(|turn| {
                let role = match turn.role {
                    Role::User => "User",
                    Role::Assistant => "Assistant",
                };
                format!("{}: {}", role, turn.content)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn summarize_goals(turns: &[ConversationTurn]) -> Option<String> {
    let goals: Vec<&ConversationTurn> = turns.iter().filter(|t| t.role == Role::User).collect();
    if goals.is_empty() {
        return None;
    }

    let skipped = goals.len().saturating_sub(MAX_EARLIER_GOALS);
    let listed = goals[skipped..]
        .iter()
        .map(|t| preview(&t.content, EARLIER_GOAL_CHARS))
        .collect::<Vec<_>>()
        .join("; ");

    Some(if skipped > 0 {
        format!("Earlier in this session ({} older requests omitted) the user asked: {}", skipped, listed)
    } else {
        format!("Earlier in this session the user asked: {}", listed)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_keeps_everything() {
        let mut history = ConversationHistory::new();
        for i in 0..50 {
            history.add_user(format!("question {}", i));
            history.add_assistant(format!("answer {}", i), Some("analytical".into()));
        }
        assert_eq!(history.len(), 100);
        assert_eq!(history.last_user_message(), Some("question 49"));
    }

    #[test]
    fn test_format_recent_window_and_truncation() {
        let mut history = ConversationHistory::new();
        history.add_user("first");
        history.add_assistant("old reply", None);
        history.add_user("second");
        history.add_assistant("x".repeat(500), None);

        let recent = history.format_recent(1, 100);
        assert!(!recent.contains("old reply"));
        assert!(recent.contains("\nUser: second\n"));
        assert!(recent.ends_with("..."));
        assert!(recent.len() < 260);
    }

    #[test]
    fn test_format_recent_condenses_older_goals() {
        let mut history = ConversationHistory::new();
        for i in 0..12 {
            history.add_user(format!("goal {}", i));
            history.add_assistant(format!("long answer {}", i), Some("analytical".into()));
        }

        let recent = history.format_recent(2, 100);
        let first_line = recent.lines().next().unwrap();
        assert_eq!(
            first_line,
            "Earlier in this session (2 older requests omitted) the user asked: \
             goal 2; goal 3; goal 4; goal 5; goal 6; goal 7; goal 8; goal 9"
        );
        assert!(!recent.contains("long answer 9"));
        assert!(recent.contains("User: goal 10"));
        assert!(recent.ends_with("Assistant: long answer 11"));
    }

    #[test]
    fn test_format_recent_without_older_turns_has_no_summary() {
        let mut history = ConversationHistory::new();
        history.add_user("only");
        history.add_assistant("reply", None);
        assert_eq!(history.format_recent(3, 100), "User: only\nAssistant: reply");
    }

    #[test]
    fn test_transcript() {
        let mut history = ConversationHistory::new();
        history.add_user("hi");
        history.add_assistant("hello", None);
        assert_eq!(history.transcript(), "User: hi\nAssistant: hello");
    }
}

//! Memory Module
//!
//! Per-session conversation history.

pub mod episodic;

pub use episodic::{ConversationHistory, ConversationTurn, Role};

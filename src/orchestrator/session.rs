//! Session Store - Per-conversation context
//!
//! Every session lives behind its own mutex, so read-modify-write on one
//! session is serialized while other sessions proceed independently. The map
//! lock is held only long enough to find or insert an entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use crate::memory::ConversationHistory;
use crate::orchestrator::Plan;

/// Text shown to agents when no dataset is loaded.
pub const NO_DATASET: &str = "No dataset is loaded. The variable `df` is not available.";

/// Textual profile of the active dataset. Replaced, never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    pub name: String,
    pub source: Option<PathBuf>,
    /// Shape, columns and types, head rows, summary statistics
    pub profile: String,
    pub loaded_at: DateTime<Utc>,
}

impl DatasetDescriptor {
    pub fn new(name: impl Into<String>, profile: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: None,
            profile: profile.into(),
            loaded_at: Utc::now(),
        }
    }

    pub fn with_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(path.into());
        self
    }

    /// Prompt text: the dataset name followed by its profile.
    pub fn describe(&self) -> String {
        format!("Dataset '{}' (loaded as `df`)\n{}", self.name, self.profile.trim())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    pub session_id: String,
    pub dataset: Option<DatasetDescriptor>,
    pub history: ConversationHistory,
    /// Model used for this session's calls
    pub model: String,
    pub last_plan: Option<Plan>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionContext {
    pub fn new(session_id: impl Into<String>, model: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            dataset: None,
            history: ConversationHistory::new(),
            model: model.into(),
            last_plan: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_dataset(&self) -> bool {
        self.dataset.is_some()
    }

    pub fn dataset_text(&self) -> String {
        self.dataset
            .as_ref()
            .map(DatasetDescriptor::describe)
            .unwrap_or_else(|| NO_DATASET.to_string())
    }

    /// Appends one goal/response exchange.
    pub fn record_exchange(&mut self, goal: &str, response: &str, mode: &str) {
        self.history.add_user(goal);
        self.history.add_assistant(response, Some(mode.to_string()));
        self.updated_at = Utc::now();
    }

    pub fn set_last_plan(&mut self, plan: Plan) {
        self.last_plan = Some(plan);
        self.updated_at = Utc::now();
    }
}

pub type SharedSession = Arc<Mutex<SessionContext>>;

pub struct SessionStore {
    sessions: RwLock<HashMap<String, SharedSession>>,
    default_model: String,
}

impl SessionStore {
    pub fn new(default_model: impl Into<String>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            default_model: default_model.into(),
        }
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub async fn get_or_create(&self, session_id: &str) -> SharedSession {
        if let Some(existing) = self.sessions.read().await.get(session_id) {
            return existing.clone();
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                info!("Created session {}", session_id);
                Arc::new(Mutex::new(SessionContext::new(session_id, &self.default_model)))
            })
            .clone()
    }

    pub async fn get(&self, session_id: &str) -> Option<SharedSession> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Copy of a session's current context.
    pub async fn snapshot(&self, session_id: &str) -> Option<SessionContext> {
        let session = self.get(session_id).await?;
        let ctx = session.lock().await;
        Some(ctx.clone())
    }

    /// Replaces the session's whole context for a new dataset. History is cleared;
    /// the model choice is kept.
    pub async fn load_dataset(&self, session_id: &str, dataset: DatasetDescriptor) {
        let session = self.get_or_create(session_id).await;
        let mut ctx = session.lock().await;
        let mut fresh = SessionContext::new(session_id, ctx.model.clone());
        info!("Session {}: loaded dataset '{}'", session_id, dataset.name);
        fresh.dataset = Some(dataset);
        *ctx = fresh;
    }

    pub async fn set_model(&self, session_id: &str, model: impl Into<String>) {
        let session = self.get_or_create(session_id).await;
        let mut ctx = session.lock().await;
        ctx.model = model.into();
        ctx.updated_at = Utc::now();
    }

    pub async fn remove(&self, session_id: &str) -> bool {
        self.sessions.write().await.remove(session_id).is_some()
    }

    pub async fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_or_create_returns_same_entry() {
        let store = SessionStore::new("m");
        let a = store.get_or_create("s1").await;
        let b = store.get_or_create("s1").await;
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(store.session_ids().await, vec!["s1".to_string()]);
    }

    #[tokio::test]
    async fn test_concurrent_writes_to_one_session_are_serialized() {
        let store = Arc::new(SessionStore::new("m"));
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let session = store.get_or_create("shared").await;
                let mut ctx = session.lock().await;
                let before = ctx.history.len();
                tokio::task::yield_now().await;
                ctx.record_exchange(&format!("goal {}", i), "ok", "analytical");
                assert_eq!(ctx.history.len(), before + 2);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let ctx = store.snapshot("shared").await.unwrap();
        assert_eq!(ctx.history.len(), 64);
    }

    #[tokio::test]
    async fn test_load_dataset_resets_history_keeps_model() {
        let store = SessionStore::new("default-model");
        store.set_model("s", "custom-model").await;
        {
            let session = store.get_or_create("s").await;
            session.lock().await.record_exchange("old goal", "old answer", "analytical");
        }

        store
            .load_dataset("s", DatasetDescriptor::new("sales.csv", "shape: (10, 3)").with_source("/tmp/sales.csv"))
            .await;

        let ctx = store.snapshot("s").await.unwrap();
        assert!(ctx.history.is_empty());
        assert!(ctx.last_plan.is_none());
        assert_eq!(ctx.model, "custom-model");
        assert!(ctx.dataset_text().contains("shape: (10, 3)"));
    }

    #[test]
    fn test_dataset_text_without_dataset() {
        let ctx = SessionContext::new("s", "m");
        assert_eq!(ctx.dataset_text(), NO_DATASET);
        assert!(!ctx.has_dataset());
    }

    #[test]
    fn test_remove_session() {
        let store = SessionStore::new("m");
        tokio_test::block_on(async {
            store.get_or_create("gone").await;
            assert!(store.remove("gone").await);
            assert!(store.snapshot("gone").await.is_none());
        });
    }
}

//! Shared execution context and result shapes for built-in tools.

use std::sync::Arc;

use assistant_core::clients::{EmbeddingClient, EntityStore, RetrievalService};
use assistant_core::config::Config;
use assistant_core::memory::{MemoryStore, WorkingType};
use assistant_core::types::EntityType;
use serde_json::Value;

/// Everything a `Tool::execute` needs beyond its own arguments.
pub struct ToolContext {
    pub user_id: String,
    pub session_id: String,
    pub memory: Arc<MemoryStore>,
    pub entities: Arc<dyn EntityStore>,
    pub retrieval: Arc<dyn RetrievalService>,
    pub embedder: Arc<dyn EmbeddingClient>,
    pub config: Config,
}

/// What changed, for the executor's uniform mutation side effect: append
/// an episodic event, update working memory, signal the summarizer.
#[derive(Debug, Clone)]
pub struct MutationEffect {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub action_type: String,
    pub description: String,
    pub working_update: Option<(WorkingType, String)>,
}

/// The value a tool call returns to its caller, plus an optional mutation
/// record the executor acts on after a successful call.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub value: Value,
    pub mutation: Option<MutationEffect>,
}

impl ToolOutcome {
    #[must_use]
    pub fn read_only(value: Value) -> Self {
        Self {
            value,
            mutation: None,
        }
    }
}

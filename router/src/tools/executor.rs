//! `ToolExecutor` — one tool invocation against internal stores, plus
//! the mandatory post-mutation side effect: append an episodic event,
//! update working memory, and signal the episodic summarizer.

use std::collections::HashMap;
use std::sync::Arc;

use assistant_core::clients::{EmbeddingClient, EntityStore, RetrievalService};
use assistant_core::config::Config;
use assistant_core::error::{Error, Result};
use assistant_core::memory::MemoryStore;
use assistant_core::types::EntityType;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::instrument;

use super::context::ToolContext;
use super::registry::ToolRegistry;
use crate::summarizer::EpisodicSummarizer;

/// Executes one named tool call, applying the uniform mutation side effect
/// on success.
pub struct ToolExecutor {
    registry: ToolRegistry,
    memory: Arc<MemoryStore>,
    entities: Arc<dyn EntityStore>,
    retrieval: Arc<dyn RetrievalService>,
    embedder: Arc<dyn EmbeddingClient>,
    config: Config,
    summarizer: Arc<EpisodicSummarizer>,
    /// Per-entity activity counters. The document store does not track
    /// this; the executor is the single place mutations flow through, so it
    /// is the natural owner of the counter the summarizer trigger needs.
    activity_counts: Mutex<HashMap<(EntityType, String), u64>>,
}

impl ToolExecutor {
    #[must_use]
    pub fn new(
        memory: Arc<MemoryStore>,
        entities: Arc<dyn EntityStore>,
        retrieval: Arc<dyn RetrievalService>,
        embedder: Arc<dyn EmbeddingClient>,
        config: Config,
        summarizer: Arc<EpisodicSummarizer>,
    ) -> Self {
        Self {
            registry: ToolRegistry::builtin(),
            memory,
            entities,
            retrieval,
            embedder,
            config,
            summarizer,
            activity_counts: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    #[instrument(skip(self, args))]
    pub async fn execute(&self, name: &str, args: Value, user_id: &str, session_id: &str) -> Result<Value> {
        let tool = self
            .registry
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("tool '{name}'")))?;

        let ctx = ToolContext {
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            memory: Arc::clone(&self.memory),
            entities: Arc::clone(&self.entities),
            retrieval: Arc::clone(&self.retrieval),
            embedder: Arc::clone(&self.embedder),
            config: self.config.clone(),
        };

        let outcome = tool.execute(args, &ctx).await?;

        if let Some(mutation) = outcome.mutation {
            let mut metadata = HashMap::new();
            metadata.insert("tool".to_string(), Value::String(name.to_string()));

            self.memory
                .record_episodic(user_id, &mutation.action_type, &mutation.description, metadata, true)
                .await?;

            if let Some((working_type, value)) = mutation.working_update {
                self.memory.set_working(session_id, working_type, value, HashMap::new());
            }

            let activity_count = {
                let mut counts = self.activity_counts.lock();
                let counter = counts
                    .entry((mutation.entity_type, mutation.entity_id.clone()))
                    .or_insert(0);
                *counter += 1;
                *counter
            };

            match mutation.entity_type {
                EntityType::Task => {
                    self.summarizer
                        .maybe_trigger_task(mutation.entity_id, activity_count, mutation.description);
                }
                EntityType::Project => {
                    let narrative_changed = outcome
                        .value
                        .get("changed_narrative")
                        .and_then(Value::as_bool)
                        .unwrap_or(true);
                    self.summarizer.maybe_trigger_project(
                        mutation.entity_id,
                        narrative_changed,
                        activity_count,
                        mutation.description,
                    );
                }
            }

            Ok(outcome.value)
        } else {
            Ok(outcome.value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeEntityStore, FakeRetrievalService};
    use assistant_core::testing::{fake_embedder, FakeLlmClient};
    use serde_json::json;

    fn test_executor() -> ToolExecutor {
        let memory = Arc::new(MemoryStore::new(fake_embedder(), Config::default()));
        let summarizer = Arc::new(EpisodicSummarizer::new(Arc::clone(&memory), Arc::new(FakeLlmClient::new())));
        ToolExecutor::new(
            memory,
            Arc::new(FakeEntityStore::new()),
            Arc::new(FakeRetrievalService::new()),
            fake_embedder(),
            Config::default(),
            summarizer,
        )
    }

    #[tokio::test]
    async fn create_task_then_complete_appends_episodic_events() {
        let executor = test_executor();
        let created = executor
            .execute("create_task", json!({"title": "Write docs"}), "u1", "s1")
            .await
            .unwrap();
        let id = created["id"].as_str().unwrap().to_string();

        executor
            .execute("complete_task", json!({"reference": id}), "u1", "s1")
            .await
            .unwrap();

        let events = executor.memory.list_episodic(
            "u1",
            assistant_core::memory::EpisodicFilter {
                time_range: None,
                action_type: None,
                limit: 0,
            },
        );
        assert_eq!(events.len(), 2);
    }

    #[tokio::test]
    async fn unknown_tool_is_not_found() {
        let executor = test_executor();
        let err = executor.execute("not_a_tool", json!({}), "u1", "s1").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}

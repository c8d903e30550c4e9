//! `EpisodicSummarizer`: trigger-driven summary generation.
//!
//! Summaries are fire-and-forget: a trigger spawns a detached task with its
//! own short deadline and never blocks the mutating operation. Failures are
//! logged, never surfaced to the caller — summarizer invocations are
//! detached from the request lifetime entirely.

use std::sync::Arc;
use std::time::Duration;

use assistant_core::clients::{CacheControl, LlmClient, LlmMessage, LlmRole};
use assistant_core::memory::MemoryStore;
use assistant_core::types::EntityType;
use tracing::{instrument, warn};

/// Own deadline for a detached summarization call, distinct from the
/// request-scoped LLM deadline.
const SUMMARIZER_DEADLINE: Duration = Duration::from_secs(10);

pub struct EpisodicSummarizer {
    memory: Arc<MemoryStore>,
    llm: Arc<dyn LlmClient>,
}

impl EpisodicSummarizer {
    #[must_use]
    pub fn new(memory: Arc<MemoryStore>, llm: Arc<dyn LlmClient>) -> Self {
        Self { memory, llm }
    }

    /// Task trigger: fires when `activity_count` lands on `1, 5, 9, 13, ...`
    /// i.e. at creation and every fourth subsequent update.
    #[must_use]
    pub fn task_should_trigger(activity_count: u64) -> bool {
        activity_count >= 1 && (activity_count - 1) % 4 == 0
    }

    /// Signals a trigger and, if it should fire, spawns the detached
    /// generation task. Never awaited by the caller.
    pub fn maybe_trigger_task(self: &Arc<Self>, entity_id: String, activity_count: u64, recent_description: String) {
        if !Self::task_should_trigger(activity_count) {
            return;
        }
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.generate_and_store(EntityType::Task, entity_id, activity_count, recent_description)
                .await;
        });
    }

    /// Project trigger: fires only when this mutation changed
    /// `description`/`notes` (passed in by the executor, which knows the
    /// patch shape).
    pub fn maybe_trigger_project(self: &Arc<Self>, entity_id: String, narrative_changed: bool, activity_count: u64, recent_description: String) {
        if !narrative_changed {
            return;
        }
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.generate_and_store(EntityType::Project, entity_id, activity_count, recent_description)
                .await;
        });
    }

    #[instrument(skip(self, recent_description))]
    async fn generate_and_store(&self, entity_type: EntityType, entity_id: String, activity_count: u64, recent_description: String) {
        let prompt = format!(
            "Summarize the recent activity for this {entity_type:?} in one or two sentences: {recent_description}"
        );
        let messages = vec![LlmMessage {
            role: LlmRole::User,
            content: prompt,
            tool_call: None,
            tool_result: None,
        }];
        let result = tokio::time::timeout(
            SUMMARIZER_DEADLINE,
            self.llm.complete("You write terse activity summaries.", &messages, &[], 0.2, CacheControl::None),
        )
        .await;

        let summary_text = match result {
            Ok(Ok(completion)) => completion.text.unwrap_or(recent_description),
            Ok(Err(err)) => {
                warn!(%err, entity_id, "episodic summary generation failed");
                return;
            }
            Err(_) => {
                warn!(entity_id, "episodic summary generation timed out");
                return;
            }
        };

        self.memory
            .store_summary(entity_type, &entity_id, summary_text, activity_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_trigger_fires_at_one_five_nine_thirteen() {
        for n in [1, 5, 9, 13, 17] {
            assert!(EpisodicSummarizer::task_should_trigger(n), "expected trigger at {n}");
        }
        for n in [2, 3, 4, 6, 7, 8, 10] {
            assert!(!EpisodicSummarizer::task_should_trigger(n), "expected no trigger at {n}");
        }
    }
}

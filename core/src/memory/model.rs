//! Record shapes for the seven memory stores.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::types::{Embedding, EntityType, HandoffStatus, PreferenceSource};

/// Which working-memory slot an entry occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkingType {
    CurrentProject,
    CurrentTask,
    LastAction,
}

/// Per-session scratchpad entry. `created_at + 2h` is the expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingMemoryEntry {
    pub session_id: String,
    pub working_type: WorkingType,
    pub value: String,
    pub metadata: HashMap<String, Value>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Immutable action log entry, optionally embedded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodicEvent {
    pub id: Uuid,
    pub user_id: String,
    pub action_type: String,
    pub description: String,
    pub metadata: HashMap<String, Value>,
    pub embedding: Option<Embedding>,
    pub created_at: DateTime<Utc>,
}

/// A learned user preference, upserted on `(user_id, key)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferenceRecord {
    pub user_id: String,
    pub key: String,
    pub value: String,
    pub source: PreferenceSource,
    pub confidence: f32,
    pub times_used: u64,
    pub updated_at: DateTime<Utc>,
}

/// An ordered task-title list within a phase of a workflow template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplatePhase {
    pub name: String,
    pub task_titles: Vec<String>,
}

/// What a `ProceduralRule` carries beyond the trigger/action envelope when
/// `rule_type == Template`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct WorkflowTemplate {
    pub phases: Vec<TemplatePhase>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    Rule,
    Template,
}

/// A condition-action rule, keyed by `(user_id, normalized_trigger)`.
/// Also used to store workflow templates (`rule_type = Template`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProceduralRule {
    pub user_id: String,
    pub trigger: String,
    pub normalized_trigger: String,
    pub rule_type: RuleType,
    pub action_tag: String,
    pub parameters: HashMap<String, Value>,
    pub confidence: f32,
    pub times_used: u64,
    pub last_used: Option<DateTime<Utc>>,
    pub template: Option<WorkflowTemplate>,
}

impl ProceduralRule {
    /// `normalized_trigger = lowercase(trim(trigger))`.
    #[must_use]
    pub fn normalize(trigger: &str) -> String {
        trigger.trim().to_lowercase()
    }
}

/// A short-lived inter-agent mailbox entry, 5-minute TTL, atomically
/// consumed exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedHandoff {
    pub id: Uuid,
    pub session_id: String,
    pub from_agent: String,
    pub to_agent: String,
    pub handoff_type: String,
    pub payload: Value,
    pub status: HandoffStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// A query-keyed cache entry of an external-fetch result, 7-day TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeCacheEntry {
    pub id: Uuid,
    pub user_id: String,
    pub query: String,
    pub query_embedding: Embedding,
    pub result_text: String,
    pub summary: Option<String>,
    pub source: String,
    pub times_accessed: u64,
    pub fetched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// The `(server, tool, arguments)` triple a discovery resolved to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoverySolution {
    pub server: String,
    pub tool: String,
    pub arguments: Value,
}

/// A recorded external-tool invocation outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryRecord {
    pub id: Uuid,
    pub user_id: String,
    pub user_request: String,
    pub request_embedding: Embedding,
    pub solution: DiscoverySolution,
    pub success: bool,
    pub execution_time_ms: u64,
    pub times_used: u64,
    pub promoted: bool,
    pub user_scope: String,
    pub created_at: DateTime<Utc>,
}

/// Most-recent-wins natural-language summary for a task or project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpisodicSummary {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub generated_at: DateTime<Utc>,
    pub summary: String,
    pub activity_count: u64,
}

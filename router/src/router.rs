//! `Router`: the top of the cascade. Pattern match, explicit command,
//! single-turn agent loop (optionally via the multi-step planner), and
//! discovery, tried strictly in that order.

use std::sync::Arc;

use assistant_core::config::Config;
use assistant_core::error::{Error, Result};
use assistant_core::memory::MemoryStore;
use serde_json::{json, Value};
use tracing::instrument;

use crate::agent_loop::LlmAgentLoop;
use crate::command::{Command, CommandParser};
use crate::context::build_context_block;
use crate::discovery::{DiscoveryAgent, DiscoverySource};
use crate::metrics::{Metrics, TierHit};
use crate::pattern::PatternMatcher;
use crate::planner::MultiStepPlanner;
use crate::tools::ToolExecutor;

const BASE_SYSTEM_PROMPT: &str = "You are a conversational task and project assistant. Use the provided tools to read and mutate the user's tasks and projects. Prefer the most specific tool for the job.";

/// What the router ultimately produced, tagged with which tier served it.
#[derive(Debug, Clone)]
pub struct RouterResponse {
    pub text: String,
    pub tier: TierHit,
    pub truncated: bool,
}

/// A coarse classification used only to decide "can the built-in tool
/// catalogue plausibly answer this" vs "this needs external research".
/// Not a general NLU component — a cheap keyword heuristic is enough to
/// gate the discovery path, which is itself cheap to fall back out of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Intent {
    StaticToolsHandleable,
    Research,
}

const DISCOVERY_INDICATORS: &[&str] = &[
    "research",
    "search the web",
    "look up online",
    "what's the latest",
    "current price",
    "news about",
    "find out",
    "what do we know about",
    "recent developments",
    "show me recent",
];

fn classify_intent(utterance: &str) -> Intent {
    let lower = utterance.to_lowercase();
    if DISCOVERY_INDICATORS.iter().any(|i| lower.contains(i)) {
        Intent::Research
    } else {
        Intent::StaticToolsHandleable
    }
}

pub struct Router {
    executor: Arc<ToolExecutor>,
    agent_loop: LlmAgentLoop,
    planner: MultiStepPlanner,
    discovery: Option<Arc<DiscoveryAgent>>,
    memory: Arc<MemoryStore>,
    metrics: Arc<Metrics>,
    config: Config,
}

impl Router {
    #[must_use]
    pub fn new(
        executor: Arc<ToolExecutor>,
        agent_loop: LlmAgentLoop,
        planner: MultiStepPlanner,
        discovery: Option<Arc<DiscoveryAgent>>,
        memory: Arc<MemoryStore>,
        metrics: Arc<Metrics>,
        config: Config,
    ) -> Self {
        Self { executor, agent_loop, planner, discovery, memory, metrics, config }
    }

    #[instrument(skip(self, utterance))]
    pub async fn handle(&self, utterance: &str, user_id: &str, session_id: &str) -> Result<RouterResponse> {
        if let Some(cmd) = PatternMatcher::match_text(utterance) {
            self.metrics.record_tier_hit(TierHit::PatternMatcher);
            let text = self.execute_command(cmd, user_id, session_id).await?;
            return Ok(RouterResponse { text, tier: TierHit::PatternMatcher, truncated: false });
        }

        if CommandParser::is_command(utterance) {
            self.metrics.record_tier_hit(TierHit::CommandParser);
            let cmd = CommandParser::parse(utterance).map_err(|e| Error::Parse(e.0.clone()))?;
            let text = self.execute_command(cmd, user_id, session_id).await?;
            return Ok(RouterResponse { text, tier: TierHit::CommandParser, truncated: false });
        }

        let intent = classify_intent(utterance);
        if intent == Intent::StaticToolsHandleable || !self.config.discovery.enabled {
            return self.handle_via_agent_loop(utterance, user_id, session_id).await;
        }

        self.metrics.record_tier_hit(TierHit::Discovery);
        let Some(discovery) = &self.discovery else {
            return Err(Error::Validation(
                "Discovery mode is off. Enable it in configuration (`discovery.enabled = true`) to let me research things outside my built-in tools.".to_string(),
            ));
        };
        let response = discovery.handle(utterance, user_id).await?;
        match response.source {
            DiscoverySource::KnowledgeCache => self.metrics.record_knowledge_cache_hit(),
            DiscoverySource::DiscoveryReuse => self.metrics.record_discovery_reuse_hit(),
            DiscoverySource::NewDiscovery => self.metrics.record_fresh_discovery(),
        }
        Ok(RouterResponse { text: response.result, tier: TierHit::Discovery, truncated: false })
    }

    async fn handle_via_agent_loop(&self, utterance: &str, user_id: &str, session_id: &str) -> Result<RouterResponse> {
        self.metrics.record_tier_hit(TierHit::AgentLoop);

        if let Some(multi) = self.planner.try_handle(utterance, user_id, session_id).await? {
            let lines: Vec<String> = multi
                .steps
                .iter()
                .map(|s| format!("- [{}] {}: {}", if s.success { "ok" } else { "failed" }, s.step.description, s.detail))
                .collect();
            let headline = if multi.full_success { "Completed all steps:" } else { "Completed some steps before stopping:" };
            return Ok(RouterResponse {
                text: format!("{headline}\n{}", lines.join("\n")),
                tier: TierHit::AgentLoop,
                truncated: !multi.full_success,
            });
        }

        let context_block = build_context_block(&self.memory, user_id, session_id);
        let system_prompt = if context_block.is_empty() {
            BASE_SYSTEM_PROMPT.to_string()
        } else {
            format!("{BASE_SYSTEM_PROMPT}\n\n{context_block}")
        };
        let result = self.agent_loop.run(&system_prompt, utterance, user_id, session_id).await?;
        Ok(RouterResponse { text: result.text, tier: TierHit::AgentLoop, truncated: result.truncated })
    }

    /// Bridges the Tier-1/2 command IR onto the same tool catalogue the
    /// agent loop drives, so every mutation path (pattern, explicit
    /// command, or LLM tool call) goes through one executor and gets the
    /// same mutation side effects.
    async fn execute_command(&self, command: Command, user_id: &str, session_id: &str) -> Result<String> {
        let (tool, args) = match command {
            Command::Tasks { filters } => ("list_tasks", filters_to_args(&filters)),
            Command::Completed => ("list_tasks", json!({"status": "done"})),
            Command::Projects { filters } => {
                if let Some(project) = filters.project.clone() {
                    ("get_project", json!({"reference": project}))
                } else {
                    ("list_projects", json!({}))
                }
            }
            Command::Search { query, mode } => ("search_tasks", json!({"query": query, "mode": mode_wire(mode)})),
            Command::CompleteTask { reference } => ("complete_task", json!({"reference": reference})),
            Command::StartTask { reference } => ("start_task", json!({"reference": reference})),
            Command::StopTask { reference } => ("stop_task", json!({"reference": reference})),
            Command::AddNote { reference, text } => ("add_note", json!({"reference": reference, "text": text})),
            Command::CreateTask { title } => ("create_task", json!({"title": title})),
            Command::Help { verb } => return Ok(help_text(verb.as_deref())),
        };

        let result = self.executor.execute(tool, args, user_id, session_id).await?;
        Ok(result.to_string())
    }
}

fn mode_wire(mode: crate::command::SearchMode) -> &'static str {
    match mode {
        crate::command::SearchMode::Hybrid => "hybrid",
        crate::command::SearchMode::Vector => "vector",
        crate::command::SearchMode::Text => "text",
    }
}

fn filters_to_args(filters: &crate::command::Filters) -> Value {
    let mut args = json!({});
    if let Some(status) = filters.status {
        args["status"] = json!(status_wire(status));
    }
    if let Some(priority) = filters.priority {
        args["priority"] = json!(priority_wire(priority));
    }
    if let Some(project) = &filters.project {
        args["project"] = json!(project);
    }
    if let Some(assignee) = &filters.assignee {
        args["assignee"] = json!(assignee);
    }
    // Temporal filters (today/this_week/yesterday) are a date-range
    // predicate the real entity store's native filter language would
    // express; `list_tasks`'s in-process arg schema has no date-range
    // shape, so temporal narrowing is intentionally not forwarded here.
    args
}

fn status_wire(status: crate::command::TaskStatus) -> &'static str {
    match status {
        crate::command::TaskStatus::Todo => "todo",
        crate::command::TaskStatus::InProgress => "in_progress",
        crate::command::TaskStatus::Done => "done",
    }
}

fn priority_wire(priority: crate::command::TaskPriority) -> &'static str {
    match priority {
        crate::command::TaskPriority::Low => "low",
        crate::command::TaskPriority::Medium => "medium",
        crate::command::TaskPriority::High => "high",
    }
}

fn help_text(verb: Option<&str>) -> String {
    match verb {
        Some(v) => format!("Help for '{v}' is not written yet; try /tasks, /projects, /search, or /do."),
        None => "Available commands: /tasks, /completed, /projects, /search, /do complete|start|stop|note|create, /help".to_string(),
    }
}

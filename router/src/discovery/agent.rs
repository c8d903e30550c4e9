//! `DiscoveryAgent`: the three-way cache/reuse/fresh-discovery decision
//! that backs the external-research tier of the router.

use std::sync::Arc;
use std::time::{Duration, Instant};

use assistant_core::clients::{CacheControl, LlmClient, LlmMessage, LlmRole, ToolSpec};
use assistant_core::config::Config;
use assistant_core::error::{Error, Result};
use assistant_core::memory::{DiscoverySolution, MemoryStore};
use serde_json::Value;
use tracing::{instrument, warn};

use super::sessions::SessionManager;
use crate::compression::summarize_external_result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoverySource {
    KnowledgeCache,
    DiscoveryReuse,
    NewDiscovery,
}

#[derive(Debug, Clone)]
pub struct DiscoveryResponse {
    pub source: DiscoverySource,
    pub result: String,
    pub server: Option<String>,
}

pub struct DiscoveryAgent {
    memory: Arc<MemoryStore>,
    llm: Arc<dyn LlmClient>,
    sessions: Arc<SessionManager>,
    config: Config,
}

impl DiscoveryAgent {
    #[must_use]
    pub fn new(memory: Arc<MemoryStore>, llm: Arc<dyn LlmClient>, sessions: Arc<SessionManager>, config: Config) -> Self {
        Self { memory, llm, sessions, config }
    }

    #[instrument(skip(self, request))]
    pub async fn handle(&self, request: &str, user_id: &str) -> Result<DiscoveryResponse> {
        if !self.config.discovery.enabled {
            return Err(Error::Validation(
                "Discovery mode is off. Enable it in configuration (`discovery.enabled = true`) to let me research things outside my built-in tools.".to_string(),
            ));
        }

        let reuse_threshold = self.config.thresholds.cache_and_discovery_reuse;

        // 1. Cache lookup.
        let cache_hits = self.memory.search_knowledge(user_id, request, reuse_threshold, 1).await?;
        if let Some(hit) = cache_hits.into_iter().next() {
            let result = hit.entry.summary.clone().unwrap_or(hit.entry.result_text.clone());
            return Ok(DiscoveryResponse { source: DiscoverySource::KnowledgeCache, result, server: None });
        }

        // 2. Discovery reuse.
        if let Some(record) = self.memory.find_similar_discovery(user_id, request, reuse_threshold, true).await? {
            match self.execute_solution(&record.solution).await {
                Ok(value) => {
                    // `find_similar_discovery` already incremented this
                    // record's `times_used`; reuse executes the recorded
                    // solution directly, it does not log a second, fresh
                    // `DiscoveryRecord` (that's step 3's job).
                    return Ok(DiscoveryResponse {
                        source: DiscoverySource::DiscoveryReuse,
                        result: value.to_string(),
                        server: Some(record.solution.server.clone()),
                    });
                }
                Err(err) => {
                    warn!(%err, "discovery reuse failed, falling through to fresh discovery");
                }
            }
        }

        // 3. Fresh discovery.
        self.fresh_discovery(request, user_id).await
    }

    async fn execute_solution(&self, solution: &DiscoverySolution) -> Result<Value> {
        let transport = self
            .sessions
            .transport_for(&solution.server)
            .ok_or_else(|| Error::NotFound(format!("external server '{}'", solution.server)))?;
        transport
            .call_tool(&solution.tool, solution.arguments.clone(), self.config.deadlines.external_tool)
            .await
    }

    async fn fresh_discovery(&self, request: &str, user_id: &str) -> Result<DiscoveryResponse> {
        let available = self.sessions.list_all_tools().await;
        if available.is_empty() {
            return Err(Error::Transport("no external tool servers are connected".to_string()));
        }

        let tool_specs: Vec<ToolSpec> = available
            .iter()
            .map(|(server, tool)| ToolSpec {
                name: format!("{server}::{}", tool.name),
                description: tool.description.clone(),
                input_schema: tool.input_schema.clone(),
            })
            .collect();

        let messages = vec![LlmMessage {
            role: LlmRole::User,
            content: format!("Pick the single best external tool to answer: {request}"),
            tool_call: None,
            tool_result: None,
        }];
        let completion = self
            .llm
            .complete("Choose exactly one external tool call to satisfy the request.", &messages, &tool_specs, 0.0, CacheControl::None)
            .await?;

        let chosen = completion
            .tool_calls
            .first()
            .ok_or_else(|| Error::Validation("the model did not choose an external tool".to_string()))?;
        let (server, tool_name) = chosen
            .name
            .split_once("::")
            .ok_or_else(|| Error::Internal(format!("malformed qualified tool name '{}'", chosen.name)))?;

        let started = Instant::now();
        let solution = DiscoverySolution {
            server: server.to_string(),
            tool: tool_name.to_string(),
            arguments: chosen.arguments.clone(),
        };
        let outcome = self.execute_solution(&solution).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Ok(value) => {
                self.memory.log_discovery(user_id, request, solution.clone(), true, elapsed_ms).await?;

                let raw = value.to_string();
                let summary = if raw.len() > self.config.discovery.summarize_threshold_chars {
                    Some(summarize_external_result(self.llm.as_ref(), &raw).await?)
                } else {
                    None
                };
                self.memory
                    .cache_knowledge(user_id, request, raw.clone(), summary.clone(), &solution.server, self.config.ttls.knowledge_cache_days)
                    .await?;

                Ok(DiscoveryResponse {
                    source: DiscoverySource::NewDiscovery,
                    result: summary.unwrap_or(raw),
                    server: Some(solution.server),
                })
            }
            Err(err) => {
                self.memory.log_discovery(user_id, request, solution, false, elapsed_ms).await?;
                Err(err)
            }
        }
    }

    /// Deadline helper exposed for callers composing their own timeouts
    /// around discovery: every external-server tool call is a suspension
    /// point with a deadline.
    #[must_use]
    pub fn external_tool_deadline(&self) -> Duration {
        self.config.deadlines.external_tool
    }
}

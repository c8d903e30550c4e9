//! `LlmAgentLoop`: the bounded tool-calling reasoning loop that powers the
//! built-in tool tier of the router.

use std::sync::Arc;

use assistant_core::clients::{CacheControl, LlmClient, LlmMessage, LlmRole, ToolCallRequest};
use assistant_core::config::Config;
use assistant_core::error::Result;
use serde_json::{json, Value};
use tracing::{instrument, warn};

use crate::compression::compress_tool_result;
use crate::tools::ToolExecutor;

/// Outcome of one agent-loop run.
#[derive(Debug, Clone)]
pub struct AgentLoopResult {
    pub text: String,
    /// Set when the iteration limit was hit before a final answer arrived;
    /// callers get the last partial text along with this flag.
    pub truncated: bool,
}

pub struct LlmAgentLoop {
    llm: Arc<dyn LlmClient>,
    executor: Arc<ToolExecutor>,
    config: Config,
}

impl LlmAgentLoop {
    #[must_use]
    pub fn new(llm: Arc<dyn LlmClient>, executor: Arc<ToolExecutor>, config: Config) -> Self {
        Self { llm, executor, config }
    }

    #[instrument(skip(self, system_prompt, user_utterance))]
    pub async fn run(&self, system_prompt: &str, user_utterance: &str, user_id: &str, session_id: &str) -> Result<AgentLoopResult> {
        let mut messages = vec![LlmMessage {
            role: LlmRole::User,
            content: user_utterance.to_string(),
            tool_call: None,
            tool_result: None,
        }];

        let tool_specs = self.executor.registry().specs(None);
        let cache_control = if self.config.agent_loop.prompt_caching_enabled {
            CacheControl::CacheSystemPrefix
        } else {
            CacheControl::None
        };

        let mut last_text = String::new();

        for iteration in 0..self.config.agent_loop.max_iterations {
            let completion = self
                .llm
                .complete(system_prompt, &messages, &tool_specs, 0.7, cache_control)
                .await?;

            if let Some(text) = completion.text {
                return Ok(AgentLoopResult { text, truncated: false });
            }

            if completion.tool_calls.is_empty() {
                // No final text and no tool calls: nothing further to drive
                // the loop; treat as a (non-truncated) empty answer.
                return Ok(AgentLoopResult { text: last_text, truncated: false });
            }

            for call in &completion.tool_calls {
                self.run_one_tool_call(call, user_id, session_id, &mut messages).await;
            }

            last_text = format!("(reasoning after {} iterations, no final answer yet)", iteration + 1);
        }

        warn!(user_id, session_id, "agent loop hit the iteration limit without a final answer");
        Ok(AgentLoopResult { text: last_text, truncated: true })
    }

    async fn run_one_tool_call(&self, call: &ToolCallRequest, user_id: &str, session_id: &str, messages: &mut Vec<LlmMessage>) {
        messages.push(LlmMessage {
            role: LlmRole::Assistant,
            content: String::new(),
            tool_call: Some(call.clone()),
            tool_result: None,
        });

        let result = if let Err(validation_err) = validate_tool_call(call) {
            // Malformed tool call: append validation error, loop continues,
            // executor never sees it.
            json!({"error": validation_err, "recoverable": true})
        } else {
            match self.executor.execute(&call.name, call.arguments.clone(), user_id, session_id).await {
                Ok(value) => compress_tool_result(&call.name, &value),
                Err(err) => {
                    // Tool raised: append structured error, loop continues.
                    json!({"error": err.to_string(), "recoverable": err.is_recoverable()})
                }
            }
        };

        messages.push(LlmMessage {
            role: LlmRole::Tool,
            content: String::new(),
            tool_call: Some(call.clone()),
            tool_result: Some(result),
        });
    }
}

/// Validates a raw tool-call payload against its declared schema shape
/// before dispatch; malformed calls become a validation-error message
/// without ever reaching the executor.
#[must_use]
pub fn validate_tool_call(call: &ToolCallRequest) -> std::result::Result<(), String> {
    if call.name.trim().is_empty() {
        return Err("tool call is missing a name".to_string());
    }
    if !call.arguments.is_object() && !call.arguments.is_null() {
        return Err(format!("tool call '{}' arguments must be a JSON object", call.name));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summarizer::EpisodicSummarizer;
    use crate::testing::{FakeEntityStore, FakeRetrievalService};
    use assistant_core::clients::{FinishReason, LlmCompletion};
    use assistant_core::memory::MemoryStore;
    use assistant_core::testing::{fake_embedder, FakeLlmClient};

    fn test_loop(scripted: Vec<LlmCompletion>) -> LlmAgentLoop {
        let memory = Arc::new(MemoryStore::new(fake_embedder(), Config::default()));
        let llm = Arc::new(FakeLlmClient::new());
        for response in scripted {
            llm.push(response);
        }
        let summarizer = Arc::new(EpisodicSummarizer::new(Arc::clone(&memory), Arc::new(FakeLlmClient::new())));
        let executor = Arc::new(ToolExecutor::new(
            memory,
            Arc::new(FakeEntityStore::new()),
            Arc::new(FakeRetrievalService::new()),
            fake_embedder(),
            Config::default(),
            summarizer,
        ));
        LlmAgentLoop::new(llm, executor, Config::default())
    }

    #[tokio::test]
    async fn returns_final_text_immediately() {
        let agent_loop = test_loop(vec![LlmCompletion {
            text: Some("done".to_string()),
            tool_calls: vec![],
            usage: Default::default(),
            finish_reason: Some(FinishReason::Stop),
        }]);
        let result = agent_loop.run("sys", "hello", "u1", "s1").await.unwrap();
        assert_eq!(result.text, "done");
        assert!(!result.truncated);
    }

    #[tokio::test]
    async fn executes_tool_call_then_returns_final_text() {
        let agent_loop = test_loop(vec![
            LlmCompletion {
                text: None,
                tool_calls: vec![ToolCallRequest {
                    id: "call-1".to_string(),
                    name: "create_task".to_string(),
                    arguments: json!({"title": "Write docs"}),
                }],
                usage: Default::default(),
                finish_reason: Some(FinishReason::ToolCalls),
            },
            LlmCompletion {
                text: Some("created it".to_string()),
                tool_calls: vec![],
                usage: Default::default(),
                finish_reason: Some(FinishReason::Stop),
            },
        ]);
        let result = agent_loop.run("sys", "add a task to write docs", "u1", "s1").await.unwrap();
        assert_eq!(result.text, "created it");
    }

    #[tokio::test]
    async fn unknown_tool_produces_error_message_and_loop_continues() {
        let agent_loop = test_loop(vec![
            LlmCompletion {
                text: None,
                tool_calls: vec![ToolCallRequest {
                    id: "call-1".to_string(),
                    name: "not_a_real_tool".to_string(),
                    arguments: json!({}),
                }],
                usage: Default::default(),
                finish_reason: Some(FinishReason::ToolCalls),
            },
            LlmCompletion {
                text: Some("sorry, couldn't do that".to_string()),
                tool_calls: vec![],
                usage: Default::default(),
                finish_reason: Some(FinishReason::Stop),
            },
        ]);
        let result = agent_loop.run("sys", "do the impossible", "u1", "s1").await.unwrap();
        assert_eq!(result.text, "sorry, couldn't do that");
    }

    #[test]
    fn validate_rejects_empty_name() {
        let call = ToolCallRequest {
            id: "x".to_string(),
            name: String::new(),
            arguments: json!({}),
        };
        assert!(validate_tool_call(&call).is_err());
    }

    #[test]
    fn validate_rejects_non_object_arguments() {
        let call = ToolCallRequest {
            id: "x".to_string(),
            name: "create_task".to_string(),
            arguments: json!("not an object"),
        };
        assert!(validate_tool_call(&call).is_err());
    }
}

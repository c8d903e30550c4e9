//! `MultiStepPlanner`: sequential multi-step workflow detection, LLM-based
//! step extraction, and template-driven project/task generation (e.g.
//! "research X, then set up a GTM project").

use std::sync::Arc;

use assistant_core::clients::{CacheControl, LlmClient, LlmMessage, LlmRole};
use assistant_core::error::Result;
use assistant_core::memory::{MemoryStore, RuleType};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{instrument, warn};

use crate::discovery::DiscoveryAgent;
use crate::tools::ToolExecutor;

const SEQUENTIAL_INDICATORS: &[&str] = &["and then", "then", "and", "followed by", "after that"];
const RESEARCH_VERBS: &[&str] = &["research", "find", "look up", "investigate", "search"];
const ACTION_VERBS: &[&str] = &["create", "set up", "start", "build", "make", "generate"];
const GTM_TRIGGER: &str = "create_gtm_project";
const RESEARCH_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, Deserialize)]
pub struct PlannedStep {
    pub intent: String,
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
struct StepsPayload {
    steps: Vec<PlannedStep>,
}

#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub step: PlannedStep,
    pub success: bool,
    pub detail: String,
}

#[derive(Debug, Clone)]
pub struct MultiStepResult {
    pub steps: Vec<StepOutcome>,
    pub full_success: bool,
}

pub struct MultiStepPlanner {
    llm: Arc<dyn LlmClient>,
    executor: Arc<ToolExecutor>,
    memory: Arc<MemoryStore>,
    discovery: Option<Arc<DiscoveryAgent>>,
}

impl MultiStepPlanner {
    #[must_use]
    pub fn new(llm: Arc<dyn LlmClient>, executor: Arc<ToolExecutor>, memory: Arc<MemoryStore>, discovery: Option<Arc<DiscoveryAgent>>) -> Self {
        Self { llm, executor, memory, discovery }
    }

    /// Cheap, LLM-free gate: a sequential indicator plus at least one
    /// research-like and one action-like verb. Never calls the LLM.
    #[must_use]
    pub fn looks_multi_step(utterance: &str) -> bool {
        let lower = utterance.to_lowercase();
        let has_indicator = SEQUENTIAL_INDICATORS.iter().any(|i| lower.contains(i));
        let has_research_verb = RESEARCH_VERBS.iter().any(|v| lower.contains(v));
        let has_action_verb = ACTION_VERBS.iter().any(|v| lower.contains(v));
        has_indicator && has_research_verb && has_action_verb
    }

    /// Full detect-then-execute pipeline. Returns `None` when the utterance
    /// isn't multi-step (so the caller falls back to the single-turn agent
    /// loop) without ever calling the LLM in that case.
    #[instrument(skip(self, utterance))]
    pub async fn try_handle(&self, utterance: &str, user_id: &str, session_id: &str) -> Result<Option<MultiStepResult>> {
        if !Self::looks_multi_step(utterance) {
            return Ok(None);
        }

        let Some(steps) = self.extract_steps(utterance).await? else {
            return Ok(None);
        };

        Ok(Some(self.execute_steps(steps, user_id, session_id).await))
    }

    async fn extract_steps(&self, utterance: &str) -> Result<Option<Vec<PlannedStep>>> {
        let prompt = format!(
            "Break this request into sequential steps. Respond with strict JSON only: {{\"steps\": [{{\"intent\": \"research|create_project|generate_tasks|other\", \"description\": \"...\"}}]}}\n\nRequest: {utterance}"
        );
        let messages = vec![LlmMessage {
            role: LlmRole::User,
            content: prompt,
            tool_call: None,
            tool_result: None,
        }];
        let completion = self
            .llm
            .complete("You decompose multi-step requests into a strict JSON step list.", &messages, &[], 0.0, CacheControl::None)
            .await?;

        let Some(text) = completion.text else { return Ok(None) };
        let stripped = strip_markdown_fences(&text);
        match serde_json::from_str::<StepsPayload>(stripped) {
            Ok(payload) if !payload.steps.is_empty() => Ok(Some(payload.steps)),
            Ok(_) => Ok(None),
            Err(err) => {
                // Treat any malformed/untrusted JSON from the LLM as a
                // signal to fall back to single-turn handling rather than
                // guess at a partial parse.
                warn!(%err, "multi-step planner got malformed JSON from the LLM, falling back to single-turn handling");
                Ok(None)
            }
        }
    }

    async fn execute_steps(&self, steps: Vec<PlannedStep>, user_id: &str, session_id: &str) -> MultiStepResult {
        let mut context = serde_json::Map::new();
        let mut outcomes = Vec::with_capacity(steps.len());
        let mut aborted = false;

        for step in steps {
            if aborted {
                outcomes.push(StepOutcome {
                    step,
                    success: false,
                    detail: "skipped after an earlier step failed".to_string(),
                });
                continue;
            }

            let outcome = self.execute_one_step(&step, &mut context, user_id, session_id).await;
            let success = outcome.is_ok();
            let detail = match outcome {
                Ok(detail) => detail,
                Err(err) => err.user_message(),
            };
            if !success {
                aborted = true;
            }
            outcomes.push(StepOutcome { step, success, detail });
        }

        let full_success = !outcomes.is_empty() && outcomes.iter().all(|o| o.success);
        MultiStepResult { steps: outcomes, full_success }
    }

    async fn execute_one_step(&self, step: &PlannedStep, context: &mut serde_json::Map<String, Value>, user_id: &str, session_id: &str) -> Result<String> {
        match step.intent.as_str() {
            "research" => self.run_research_step(step, context, user_id).await,
            "create_project" => self.run_create_project_step(step, context, user_id, session_id).await,
            "generate_tasks" => self.run_generate_tasks_step(context, user_id, session_id).await,
            _ => Ok(format!("noted: {}", step.description)),
        }
    }

    async fn run_research_step(&self, step: &PlannedStep, context: &mut serde_json::Map<String, Value>, user_id: &str) -> Result<String> {
        let result_text = if let Some(discovery) = &self.discovery {
            discovery.handle(&step.description, user_id).await.map(|r| r.result)?
        } else {
            let hits = self.memory.search_knowledge(user_id, &step.description, 0.65, 3).await?;
            hits.into_iter()
                .map(|h| h.entry.summary.unwrap_or(h.entry.result_text))
                .collect::<Vec<_>>()
                .join("\n")
        };
        context.insert("research_results".to_string(), json!(result_text));
        Ok(format!("researched: {}", step.description))
    }

    async fn run_create_project_step(&self, step: &PlannedStep, context: &mut serde_json::Map<String, Value>, user_id: &str, session_id: &str) -> Result<String> {
        let name = step.description.trim().to_string();
        let result = self
            .executor
            .execute("create_project", json!({"name": name, "description": step.description}), user_id, session_id)
            .await?;
        let project_id = result.get("id").and_then(Value::as_str).unwrap_or_default().to_string();
        context.insert("project_id".to_string(), json!(project_id));
        context.insert("project_name".to_string(), json!(name.clone()));

        let lower = step.description.to_lowercase();
        if lower.contains("gtm") || lower.contains("go-to-market") {
            if let Some(rule) = self.memory.get_rule_for_trigger(user_id, GTM_TRIGGER) {
                if rule.rule_type == RuleType::Template {
                    if let Some(template) = rule.template {
                        context.insert("template".to_string(), serde_json::to_value(template)?);
                    }
                }
            }
        }
        Ok(format!("created project '{name}'"))
    }

    async fn run_generate_tasks_step(&self, context: &mut serde_json::Map<String, Value>, user_id: &str, session_id: &str) -> Result<String> {
        let Some(template_value) = context.get("template").cloned() else {
            return Ok("no workflow template resolved for this project; skipped task generation".to_string());
        };
        let template: assistant_core::memory::WorkflowTemplate = serde_json::from_value(template_value)?;
        let project_name = context.get("project_name").and_then(Value::as_str).unwrap_or("").to_string();
        let research_preview: String = context
            .get("research_results")
            .and_then(Value::as_str)
            .map(|s| s.chars().take(RESEARCH_PREVIEW_CHARS).collect())
            .unwrap_or_default();

        let mut created = Vec::new();
        for phase in &template.phases {
            for title in &phase.task_titles {
                let full_title = format!("[{}] {title}", phase.name);
                let result = self
                    .executor
                    .execute(
                        "create_task",
                        json!({"title": full_title, "project": project_name, "context": research_preview}),
                        user_id,
                        session_id,
                    )
                    .await?;
                created.push(result);
            }
        }
        context.insert("tasks_generated".to_string(), json!(created.len()));
        Ok(format!("generated {} tasks across {} phases", created.len(), template.phases.len()))
    }
}

/// Strips a leading/trailing triple-backtick fence (with an optional
/// language tag) from LLM output that was asked to emit "JSON only" but
/// wrapped it in markdown anyway. Any LLM asked for structured output is
/// untrusted until it parses and validates.
fn strip_markdown_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.trim_start_matches(['\r', '\n']);
    rest.strip_suffix("```").map_or(trimmed, str::trim_end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summarizer::EpisodicSummarizer;
    use crate::testing::{FakeEntityStore, FakeRetrievalService};
    use assistant_core::clients::FinishReason;
    use assistant_core::config::Config;
    use assistant_core::memory::{MemoryStore, TemplatePhase};
    use assistant_core::testing::{fake_embedder, FakeLlmClient};

    #[test]
    fn plain_single_step_request_is_not_multi_step() {
        assert!(!MultiStepPlanner::looks_multi_step("create a task to write docs"));
    }

    #[test]
    fn sequential_research_and_action_is_multi_step() {
        assert!(MultiStepPlanner::looks_multi_step(
            "research our competitors and then create a GTM project for the launch"
        ));
    }

    #[test]
    fn indicator_without_both_verb_classes_is_not_multi_step() {
        assert!(!MultiStepPlanner::looks_multi_step("create a task and start it"));
    }

    #[test]
    fn strips_fenced_json_block() {
        let fenced = "```json\n{\"steps\": []}\n```";
        assert_eq!(strip_markdown_fences(fenced), "{\"steps\": []}");
    }

    #[test]
    fn leaves_plain_json_untouched() {
        let plain = "{\"steps\": []}";
        assert_eq!(strip_markdown_fences(plain), plain);
    }

    fn planner_with_steps_response(steps_json: &str) -> (MultiStepPlanner, Arc<MemoryStore>) {
        let memory = Arc::new(MemoryStore::new(fake_embedder(), Config::default()));
        let llm = Arc::new(FakeLlmClient::new());
        llm.push(assistant_core::clients::LlmCompletion {
            text: Some(steps_json.to_string()),
            tool_calls: vec![],
            usage: Default::default(),
            finish_reason: Some(FinishReason::Stop),
        });
        let summarizer = Arc::new(EpisodicSummarizer::new(Arc::clone(&memory), Arc::new(FakeLlmClient::new())));
        let executor = Arc::new(ToolExecutor::new(
            Arc::clone(&memory),
            Arc::new(FakeEntityStore::new()),
            Arc::new(FakeRetrievalService::new()),
            fake_embedder(),
            Config::default(),
            summarizer,
        ));
        let planner = MultiStepPlanner::new(llm, executor, Arc::clone(&memory), None);
        (planner, memory)
    }

    #[tokio::test]
    async fn gtm_workflow_creates_project_and_tasks_from_template() {
        let (planner, memory) = planner_with_steps_response(
            r#"{"steps": [
                {"intent": "research", "description": "research the gaming market"},
                {"intent": "create_project", "description": "Launch GTM project for gaming"},
                {"intent": "generate_tasks", "description": "generate tasks from template"}
            ]}"#,
        );
        memory.upsert_template(
            "u1",
            GTM_TRIGGER,
            assistant_core::memory::WorkflowTemplate {
                phases: vec![
                    TemplatePhase { name: "Research".to_string(), task_titles: vec!["Competitor scan".to_string()] },
                    TemplatePhase { name: "Strategy".to_string(), task_titles: vec!["Positioning doc".to_string()] },
                ],
            },
        );

        let utterance = "Research the gaming market and create a GTM project with tasks";
        let result = planner.try_handle(utterance, "u1", "s1").await.unwrap().expect("should detect multi-step");

        assert!(result.full_success);
        assert_eq!(result.steps.len(), 3);

        let template = memory.get_rule_for_trigger("u1", GTM_TRIGGER).expect("template exists");
        // One increment from resolving the template during create_project,
        // one more from this assertion's own lookup.
        assert_eq!(template.times_used, 2);
    }

    #[tokio::test]
    async fn malformed_json_falls_back_to_non_multi_step() {
        let (planner, _memory) = planner_with_steps_response("not valid json at all");
        let utterance = "research the gaming market and then create a GTM project";
        let result = planner.try_handle(utterance, "u1", "s1").await.unwrap();
        assert!(result.is_none());
    }
}

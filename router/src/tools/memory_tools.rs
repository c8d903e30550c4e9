//! Memory-query tools: `search_knowledge`, `list_templates`,
//! `analyze_tool_discoveries`.

use assistant_core::error::{Error, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use super::context::ToolContext;
use super::registry::Tool;
use crate::tools::context::ToolOutcome;

/// `search_knowledge`: similarity search over the knowledge cache scoped to
/// `user_id`, permissive 0.65 threshold by default, returning `summary`
/// when present, else truncated raw results.
pub struct SearchKnowledgeTool;

#[async_trait]
impl Tool for SearchKnowledgeTool {
    fn name(&self) -> &'static str {
        "search_knowledge"
    }
    fn description(&self) -> &'static str {
        "Search previously cached external-knowledge results by meaning"
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "limit": {"type": "integer"}
            },
            "required": ["query"]
        })
    }
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutcome> {
        let query = args
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Validation("search_knowledge requires 'query'".to_string()))?;
        let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(5) as usize;
        let hits = ctx
            .memory
            .search_knowledge(&ctx.user_id, query, ctx.config.thresholds.knowledge_surfacing, limit)
            .await?;
        let items: Vec<Value> = hits
            .into_iter()
            .map(|hit| {
                let text = hit.entry.summary.clone().unwrap_or_else(|| {
                    hit.entry.result_text.chars().take(500).collect::<String>()
                });
                json!({
                    "query": hit.entry.query,
                    "text": text,
                    "score": hit.score,
                    "source": hit.entry.source,
                })
            })
            .collect();
        Ok(ToolOutcome::read_only(json!({"items": items})))
    }
}

/// `list_templates`.
pub struct ListTemplatesTool;

#[async_trait]
impl Tool for ListTemplatesTool {
    fn name(&self) -> &'static str {
        "list_templates"
    }
    fn description(&self) -> &'static str {
        "List workflow templates known for this user"
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }
    async fn execute(&self, _args: Value, ctx: &ToolContext) -> Result<ToolOutcome> {
        let templates = ctx.memory.list_templates(&ctx.user_id);
        Ok(ToolOutcome::read_only(json!({"templates": templates})))
    }
}

/// `analyze_tool_discoveries`: four arrays — `suggested_tools`,
/// `atlas_optimizations`, `template_candidates`, `feature_gaps`.
pub struct AnalyzeToolDiscoveriesTool;

#[async_trait]
impl Tool for AnalyzeToolDiscoveriesTool {
    fn name(&self) -> &'static str {
        "analyze_tool_discoveries"
    }
    fn description(&self) -> &'static str {
        "Surface promotion candidates and usage patterns from recorded tool discoveries"
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }
    async fn execute(&self, _args: Value, ctx: &ToolContext) -> Result<ToolOutcome> {
        let suggested_tools = ctx.memory.popular_discoveries(3, true, 20);

        // Query-shape patterns: group successful discoveries by (server, tool)
        // and surface those seen >= 3 times as candidates for a fast-path
        // optimization. "atlas" names the retrieval substrate, consumed
        // here as an external document store.
        let all_discoveries = ctx.memory.popular_discoveries(0, false, usize::MAX);
        let mut by_tool: std::collections::HashMap<(String, String), u64> = std::collections::HashMap::new();
        for d in &all_discoveries {
            *by_tool
                .entry((d.solution.server.clone(), d.solution.tool.clone()))
                .or_insert(0) += 1;
        }
        let atlas_optimizations: Vec<Value> = by_tool
            .into_iter()
            .filter(|(_, count)| *count >= 3)
            .map(|((server, tool), count)| json!({"server": server, "tool": tool, "seen": count}))
            .collect();

        // Repeated multi-step workflows: episodic events tagged as a
        // workflow completion, grouped by description, surfaced at >= 2
        // repeats as template candidates.
        let events = ctx.memory.list_episodic(
            &ctx.user_id,
            assistant_core::memory::EpisodicFilter {
                time_range: None,
                action_type: Some("multi_step_workflow_completed".to_string()),
                limit: 0,
            },
        );
        let mut by_description: std::collections::HashMap<String, u64> = std::collections::HashMap::new();
        for e in &events {
            *by_description.entry(e.description.clone()).or_insert(0) += 1;
        }
        let template_candidates: Vec<Value> = by_description
            .into_iter()
            .filter(|(_, count)| *count >= 2)
            .map(|(description, count)| json!({"description": description, "repeats": count}))
            .collect();

        let feature_gaps: Vec<Value> = all_discoveries
            .iter()
            .filter(|d| !d.success)
            .map(|d| json!({"request": d.user_request, "attempted": d.solution.tool}))
            .collect();

        Ok(ToolOutcome::read_only(json!({
            "suggested_tools": suggested_tools,
            "atlas_optimizations": atlas_optimizations,
            "template_candidates": template_candidates,
            "feature_gaps": feature_gaps,
        })))
    }
}

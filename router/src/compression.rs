//! Tool-result compression (before appending to the LLM message list) and
//! external-result summarization (on fresh discovery).

use assistant_core::clients::{CacheControl, LlmClient, LlmMessage, LlmRole};
use assistant_core::error::Result;
use serde_json::{json, Value};
use std::collections::HashMap;

/// Fields that must survive compression whenever present on a task.
const ENRICHMENT_FIELDS: &[&str] = &["assignee", "due_date", "blockers"];
const TASK_SUMMARY_FIELDS: &[&str] = &["id", "title", "status", "project", "priority"];

fn pick_fields(doc: &Value, base: &[&str]) -> Value {
    let mut out = serde_json::Map::new();
    for field in base.iter().chain(ENRICHMENT_FIELDS) {
        if let Some(v) = doc.get(*field) {
            out.insert((*field).to_string(), v.clone());
        }
    }
    Value::Object(out)
}

fn items_of(result: &Value, key: &str) -> Option<Vec<Value>> {
    result.get(key).and_then(Value::as_array).cloned()
}

fn status_histogram(items: &[Value]) -> HashMap<String, u64> {
    let mut hist = HashMap::new();
    for item in items {
        let status = item.get("status").and_then(Value::as_str).unwrap_or("unknown");
        *hist.entry(status.to_string()).or_insert(0) += 1;
    }
    hist
}

/// Compresses a tool's raw JSON result per the per-tool rules below. Tools not
/// named here (or whose item count is at or under the threshold) pass
/// through unchanged — note the boundary is strictly-greater-than: exactly
/// 10 `list_tasks` items is NOT compressed, 11 is.
#[must_use]
pub fn compress_tool_result(tool_name: &str, result: &Value) -> Value {
    match tool_name {
        "list_tasks" => {
            let Some(items) = items_of(result, "items") else { return result.clone() };
            if items.len() <= 10 {
                return result.clone();
            }
            let top_5: Vec<Value> = items.iter().take(5).map(|d| pick_fields(d, TASK_SUMMARY_FIELDS)).collect();
            json!({
                "total_count": items.len(),
                "summary_by_status": status_histogram(&items),
                "top_5": top_5,
                "note": "Result truncated; showing top 5 of a larger list.",
            })
        }
        "search_tasks" => {
            let Some(items) = items_of(result, "items") else { return result.clone() };
            let compact: Vec<Value> = items
                .iter()
                .map(|d| {
                    let mut base = pick_fields(d, &["id", "title", "project", "status"]);
                    if let (Some(score), Value::Object(map)) = (d.get("score"), &mut base) {
                        map.insert("score".to_string(), score.clone());
                    }
                    base
                })
                .collect();
            json!({"items": compact})
        }
        "list_projects" => {
            let Some(items) = items_of(result, "items") else { return result.clone() };
            if items.len() <= 5 {
                return result.clone();
            }
            let top_5: Vec<Value> = items
                .iter()
                .take(5)
                .map(|d| pick_fields(d, &["id", "name", "status"]))
                .collect();
            json!({
                "total_count": items.len(),
                "top_5": top_5,
                "note": "Result truncated; showing top 5 of a larger list.",
            })
        }
        _ => result.clone(),
    }
}

/// A structured summary of an external-fetch result.
#[derive(Debug, Clone)]
pub struct ExternalSummary {
    pub key_findings: Vec<String>,
    pub sources: Vec<String>,
    pub direct_answer: String,
}

impl ExternalSummary {
    #[must_use]
    pub fn to_text(&self) -> String {
        let findings = self.key_findings.join("; ");
        let sources = self.sources.join(", ");
        format!("{}\nKey findings: {}\nSources: {}", self.direct_answer, findings, sources)
    }
}

/// On fresh discovery whose raw result exceeds the configured threshold
/// (default 800 chars), ask the LLM for a structured summary.
pub async fn summarize_external_result(llm: &dyn LlmClient, raw: &str) -> Result<String> {
    let prompt = format!(
        "Summarize the following into: (1) key findings, (2) main sources with URLs, (3) a one-sentence direct answer.\n\n{raw}"
    );
    let messages = vec![LlmMessage {
        role: LlmRole::User,
        content: prompt,
        tool_call: None,
        tool_result: None,
    }];
    let completion = llm
        .complete("You write structured research summaries.", &messages, &[], 0.2, CacheControl::None)
        .await?;
    Ok(completion.text.unwrap_or_else(|| raw.chars().take(800).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(id: &str, status: &str) -> Value {
        json!({"id": id, "title": format!("task {id}"), "status": status, "project": "p1"})
    }

    #[test]
    fn list_tasks_exactly_ten_is_not_compressed() {
        let items: Vec<Value> = (0..10).map(|i| task(&i.to_string(), "todo")).collect();
        let result = json!({"items": items});
        let compressed = compress_tool_result("list_tasks", &result);
        assert_eq!(compressed, result);
    }

    #[test]
    fn list_tasks_eleven_is_compressed() {
        let items: Vec<Value> = (0..11).map(|i| task(&i.to_string(), "todo")).collect();
        let result = json!({"items": items});
        let compressed = compress_tool_result("list_tasks", &result);
        assert_eq!(compressed["total_count"], json!(11));
        assert_eq!(compressed["top_5"].as_array().unwrap().len(), 5);
    }

    #[test]
    fn enrichment_fields_survive_compression() {
        let mut items: Vec<Value> = (0..11).map(|i| task(&i.to_string(), "todo")).collect();
        items[0]["assignee"] = json!("ana");
        items[0]["due_date"] = json!("2026-08-01");
        items[0]["blockers"] = json!(["dep-1"]);
        let result = json!({"items": items});
        let compressed = compress_tool_result("list_tasks", &result);
        let first = &compressed["top_5"][0];
        assert_eq!(first["assignee"], json!("ana"));
        assert_eq!(first["due_date"], json!("2026-08-01"));
        assert_eq!(first["blockers"], json!(["dep-1"]));
    }

    #[test]
    fn other_tools_pass_through_unchanged() {
        let result = json!({"id": "t1", "title": "x"});
        assert_eq!(compress_tool_result("get_task", &result), result);
    }
}

//! Entity mutation and entity retrieval tools.

use assistant_core::error::{Error, Result};
use assistant_core::memory::EpisodicFilter;
use assistant_core::types::EntityType;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use super::context::{MutationEffect, ToolContext, ToolOutcome};
use super::registry::Tool;
use assistant_core::memory::WorkingType;

async fn resolve_task(ctx: &ToolContext, reference: &str) -> Result<Value> {
    let by_id = ctx
        .entities
        .find("tasks", &json!({"id": reference}), 1, &json!({}))
        .await?;
    if let Some(doc) = by_id.into_iter().next() {
        return Ok(doc);
    }
    let by_title = ctx
        .entities
        .find(
            "tasks",
            &json!({"title_contains": reference}),
            5,
            &json!({"sort": "relevance"}),
        )
        .await?;
    by_title
        .into_iter()
        .next()
        .ok_or_else(|| Error::NotFound(format!("a task matching '{reference}'")))
}

fn doc_id(doc: &Value) -> String {
    doc.get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn doc_title(doc: &Value) -> String {
    doc.get("title")
        .and_then(Value::as_str)
        .unwrap_or("(untitled)")
        .to_string()
}

/// `create_task`.
pub struct CreateTaskTool;

#[async_trait]
impl Tool for CreateTaskTool {
    fn name(&self) -> &'static str {
        "create_task"
    }
    fn description(&self) -> &'static str {
        "Create a new task with a title and optional project, priority, assignee, and due date"
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": {"type": "string"},
                "project": {"type": "string"},
                "priority": {"type": "string", "enum": ["low", "medium", "high"]},
                "assignee": {"type": "string"},
                "due_date": {"type": "string"},
                "context": {"type": "string"}
            },
            "required": ["title"]
        })
    }
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutcome> {
        let title = args
            .get("title")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Validation("create_task requires 'title'".to_string()))?
            .to_string();
        let mut doc = args.clone();
        doc["status"] = json!("todo");
        let id = ctx.entities.insert("tasks", doc).await?;
        Ok(ToolOutcome {
            value: json!({"id": id, "title": title, "status": "todo"}),
            mutation: Some(MutationEffect {
                entity_type: EntityType::Task,
                entity_id: id.clone(),
                action_type: "task_created".to_string(),
                description: format!("Created task '{title}'"),
                working_update: Some((WorkingType::CurrentTask, id)),
            }),
        })
    }
}

/// `update_task`.
pub struct UpdateTaskTool;

#[async_trait]
impl Tool for UpdateTaskTool {
    fn name(&self) -> &'static str {
        "update_task"
    }
    fn description(&self) -> &'static str {
        "Update fields on an existing task by id"
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"id": {"type": "string"}, "patch": {"type": "object"}},
            "required": ["id", "patch"]
        })
    }
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutcome> {
        let id = args
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Validation("update_task requires 'id'".to_string()))?
            .to_string();
        let patch = args
            .get("patch")
            .cloned()
            .ok_or_else(|| Error::Validation("update_task requires 'patch'".to_string()))?;
        ctx.entities.update("tasks", &id, patch).await?;
        Ok(ToolOutcome {
            value: json!({"id": id, "updated": true}),
            mutation: Some(MutationEffect {
                entity_type: EntityType::Task,
                entity_id: id.clone(),
                action_type: "task_updated".to_string(),
                description: format!("Updated task {id}"),
                working_update: Some((WorkingType::LastAction, format!("updated task {id}"))),
            }),
        })
    }
}

macro_rules! transition_tool {
    ($struct_name:ident, $tool_name:literal, $desc:literal, $status:literal, $action:literal) => {
        pub struct $struct_name;

        #[async_trait]
        impl Tool for $struct_name {
            fn name(&self) -> &'static str {
                $tool_name
            }
            fn description(&self) -> &'static str {
                $desc
            }
            fn input_schema(&self) -> Value {
                json!({
                    "type": "object",
                    "properties": {"reference": {"type": "string"}},
                    "required": ["reference"]
                })
            }
            async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutcome> {
                let reference = args
                    .get("reference")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::Validation(concat!($tool_name, " requires 'reference'").to_string()))?;
                let task = resolve_task(ctx, reference).await?;
                let id = doc_id(&task);
                let title = doc_title(&task);
                ctx.entities
                    .update("tasks", &id, json!({"status": $status}))
                    .await?;
                Ok(ToolOutcome {
                    value: json!({"id": id, "title": title, "status": $status}),
                    mutation: Some(MutationEffect {
                        entity_type: EntityType::Task,
                        entity_id: id.clone(),
                        action_type: $action.to_string(),
                        description: format!(concat!($desc, ": '{}'"), title),
                        working_update: Some((WorkingType::LastAction, format!(concat!($action, " {}"), title))),
                    }),
                })
            }
        }
    };
}

transition_tool!(CompleteTaskTool, "complete_task", "Marked task done", "done", "task_completed");
transition_tool!(StartTaskTool, "start_task", "Started task", "in_progress", "task_started");
transition_tool!(StopTaskTool, "stop_task", "Stopped task", "todo", "task_stopped");

/// Shared body for the `add_note`/`add_context`/`add_decision` family: each
/// appends free text to a different array field on the task document.
async fn append_text_field(
    ctx: &ToolContext,
    reference: &str,
    text: &str,
    field: &str,
    action_type: &str,
) -> Result<ToolOutcome> {
    let task = resolve_task(ctx, reference).await?;
    let id = doc_id(&task);
    let mut existing: Vec<Value> = task
        .get(field)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    existing.push(json!({"text": text, "at": Utc::now().to_rfc3339()}));
    ctx.entities
        .update("tasks", &id, json!({ field: existing }))
        .await?;
    Ok(ToolOutcome {
        value: json!({"id": id, field: text}),
        mutation: Some(MutationEffect {
            entity_type: EntityType::Task,
            entity_id: id,
            action_type: action_type.to_string(),
            description: format!("Added {field} to task: {text}"),
            working_update: None,
        }),
    })
}

macro_rules! append_tool {
    ($struct_name:ident, $tool_name:literal, $desc:literal, $field:literal, $action:literal) => {
        pub struct $struct_name;

        #[async_trait]
        impl Tool for $struct_name {
            fn name(&self) -> &'static str {
                $tool_name
            }
            fn description(&self) -> &'static str {
                $desc
            }
            fn input_schema(&self) -> Value {
                json!({
                    "type": "object",
                    "properties": {"reference": {"type": "string"}, "text": {"type": "string"}},
                    "required": ["reference", "text"]
                })
            }
            async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutcome> {
                let reference = args
                    .get("reference")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::Validation(concat!($tool_name, " requires 'reference'").to_string()))?;
                let text = args
                    .get("text")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::Validation(concat!($tool_name, " requires 'text'").to_string()))?;
                append_text_field(ctx, reference, text, $field, $action).await
            }
        }
    };
}

append_tool!(AddNoteTool, "add_note", "Add a free-form note to a task", "notes", "note_added");
append_tool!(AddContextTool, "add_context", "Add background context to a task", "context_notes", "context_added");
append_tool!(AddDecisionTool, "add_decision", "Record a decision made on a task", "decisions", "decision_added");

/// `create_project`.
pub struct CreateProjectTool;

#[async_trait]
impl Tool for CreateProjectTool {
    fn name(&self) -> &'static str {
        "create_project"
    }
    fn description(&self) -> &'static str {
        "Create a new project"
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"name": {"type": "string"}, "description": {"type": "string"}},
            "required": ["name"]
        })
    }
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutcome> {
        let name = args
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Validation("create_project requires 'name'".to_string()))?
            .to_string();
        let id = ctx.entities.insert("projects", args.clone()).await?;
        Ok(ToolOutcome {
            value: json!({"id": id, "name": name}),
            mutation: Some(MutationEffect {
                entity_type: EntityType::Project,
                entity_id: id.clone(),
                action_type: "project_created".to_string(),
                description: format!("Created project '{name}'"),
                working_update: Some((WorkingType::CurrentProject, id)),
            }),
        })
    }
}

/// `update_project`. Only a `description`/`notes` change in this mutation
/// triggers the episodic summarizer — the executor checks the patch
/// keys, not this tool, so it just reports what changed.
pub struct UpdateProjectTool;

#[async_trait]
impl Tool for UpdateProjectTool {
    fn name(&self) -> &'static str {
        "update_project"
    }
    fn description(&self) -> &'static str {
        "Update fields on an existing project by id"
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"id": {"type": "string"}, "patch": {"type": "object"}},
            "required": ["id", "patch"]
        })
    }
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutcome> {
        let id = args
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Validation("update_project requires 'id'".to_string()))?
            .to_string();
        let patch = args
            .get("patch")
            .cloned()
            .ok_or_else(|| Error::Validation("update_project requires 'patch'".to_string()))?;
        let changed_narrative = patch.get("description").is_some() || patch.get("notes").is_some();
        ctx.entities.update("projects", &id, patch).await?;
        Ok(ToolOutcome {
            value: json!({"id": id, "updated": true, "changed_narrative": changed_narrative}),
            mutation: Some(MutationEffect {
                entity_type: EntityType::Project,
                entity_id: id.clone(),
                action_type: "project_updated".to_string(),
                description: format!("Updated project {id}"),
                working_update: Some((WorkingType::LastAction, format!("updated project {id}"))),
            }),
        })
    }
}

/// `get_task` / `get_project` share retrieval shape by collection name.
macro_rules! get_by_ref_tool {
    ($struct_name:ident, $tool_name:literal, $desc:literal, $collection:literal) => {
        pub struct $struct_name;

        #[async_trait]
        impl Tool for $struct_name {
            fn name(&self) -> &'static str {
                $tool_name
            }
            fn description(&self) -> &'static str {
                $desc
            }
            fn input_schema(&self) -> Value {
                json!({
                    "type": "object",
                    "properties": {"reference": {"type": "string"}},
                    "required": ["reference"]
                })
            }
            async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutcome> {
                let reference = args
                    .get("reference")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::Validation(concat!($tool_name, " requires 'reference'").to_string()))?;
                let by_id = ctx
                    .entities
                    .find($collection, &json!({"id": reference}), 1, &json!({}))
                    .await?;
                let doc = if let Some(d) = by_id.into_iter().next() {
                    d
                } else {
                    ctx.entities
                        .find($collection, &json!({"name_contains": reference}), 1, &json!({}))
                        .await?
                        .into_iter()
                        .next()
                        .ok_or_else(|| Error::NotFound(format!("'{reference}'")))?
                };
                Ok(ToolOutcome::read_only(doc))
            }
        }
    };
}

get_by_ref_tool!(GetTaskTool, "get_task", "Get a task by id or name", "tasks");
get_by_ref_tool!(GetProjectTool, "get_project", "Get a project by id or name", "projects");

/// `list_tasks` with filters (status, priority, project, assignee, limit).
pub struct ListTasksTool;

#[async_trait]
impl Tool for ListTasksTool {
    fn name(&self) -> &'static str {
        "list_tasks"
    }
    fn description(&self) -> &'static str {
        "List tasks, optionally filtered by status, priority, project, or assignee"
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "status": {"type": "string"},
                "priority": {"type": "string"},
                "project": {"type": "string"},
                "assignee": {"type": "string"},
                "limit": {"type": "integer"}
            }
        })
    }
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutcome> {
        let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(50) as usize;
        let mut filter = json!({});
        for key in ["status", "priority", "project", "assignee"] {
            if let Some(v) = args.get(key) {
                filter[key] = v.clone();
            }
        }
        let items = ctx.entities.find("tasks", &filter, limit, &json!({})).await?;
        Ok(ToolOutcome::read_only(json!({"items": items})))
    }
}

/// `list_projects`, no filters beyond an optional limit.
pub struct ListProjectsTool;

#[async_trait]
impl Tool for ListProjectsTool {
    fn name(&self) -> &'static str {
        "list_projects"
    }
    fn description(&self) -> &'static str {
        "List all projects"
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {"limit": {"type": "integer"}}})
    }
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutcome> {
        let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(50) as usize;
        let items = ctx
            .entities
            .find("projects", &json!({}), limit, &json!({}))
            .await?;
        Ok(ToolOutcome::read_only(json!({"items": items})))
    }
}

/// `search_tasks` via hybrid (default), vector, or text retrieval.
pub struct SearchTasksTool;

#[async_trait]
impl Tool for SearchTasksTool {
    fn name(&self) -> &'static str {
        "search_tasks"
    }
    fn description(&self) -> &'static str {
        "Search tasks by free text using hybrid, vector, or text search"
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "mode": {"type": "string", "enum": ["hybrid", "vector", "text"]},
                "limit": {"type": "integer"}
            },
            "required": ["query"]
        })
    }
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutcome> {
        let query = args
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Validation("search_tasks requires 'query'".to_string()))?;
        let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(10) as usize;
        let mode = args.get("mode").and_then(Value::as_str).unwrap_or("hybrid");
        let hits = match mode {
            "text" => ctx.retrieval.text_search("tasks", query, &["title", "notes"], limit).await?,
            "vector" => {
                let qvec = ctx.embedder.embed(query).await?;
                ctx.retrieval.vector_search("tasks", "embedding", &qvec, limit, &json!({})).await?
            }
            _ => {
                let qvec = ctx.embedder.embed(query).await?;
                ctx.retrieval
                    .hybrid_search(
                        "tasks",
                        query,
                        &qvec,
                        limit,
                        ctx.config.hybrid_search.vector,
                        ctx.config.hybrid_search.text,
                    )
                    .await?
            }
        };
        let items: Vec<Value> = hits
            .into_iter()
            .map(|h| {
                let mut doc = h.doc;
                doc["score"] = json!(h.score);
                doc
            })
            .collect();
        Ok(ToolOutcome::read_only(json!({"items": items})))
    }
}

/// `get_activity` — a temporal activity query over episodic memory.
pub struct GetActivityTool;

#[async_trait]
impl Tool for GetActivityTool {
    fn name(&self) -> &'static str {
        "get_activity"
    }
    fn description(&self) -> &'static str {
        "List recent episodic activity, optionally within a time range or filtered by action type"
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "since": {"type": "string"},
                "until": {"type": "string"},
                "action_type": {"type": "string"},
                "limit": {"type": "integer"}
            }
        })
    }
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutcome> {
        let limit = args.get("limit").and_then(Value::as_u64).unwrap_or(20) as usize;
        let time_range = match (args.get("since").and_then(Value::as_str), args.get("until").and_then(Value::as_str)) {
            (Some(since), Some(until)) => {
                let since: DateTime<Utc> = since.parse().map_err(|_| Error::Validation("invalid 'since'".to_string()))?;
                let until: DateTime<Utc> = until.parse().map_err(|_| Error::Validation("invalid 'until'".to_string()))?;
                Some((since, until))
            }
            _ => None,
        };
        let events = ctx.memory.list_episodic(
            &ctx.user_id,
            EpisodicFilter {
                time_range,
                action_type: args.get("action_type").and_then(Value::as_str).map(str::to_string),
                limit,
            },
        );
        Ok(ToolOutcome::read_only(json!({"events": events})))
    }
}

//! `ToolRegistry` — the fixed catalogue of built-in tools.
//!
//! Each tool is a value implementing the small `Tool` capability (name,
//! schema, execute); the registry is a map keyed by name. Per-request
//! enablement is a set filter over that map, not a class hierarchy.

use std::collections::HashMap;
use std::sync::Arc;

use assistant_core::clients::ToolSpec;
use assistant_core::error::Result;
use async_trait::async_trait;
use serde_json::Value;

use super::context::{ToolContext, ToolOutcome};
use super::disambiguation::ResolveDisambiguationTool;
use super::entity::{
    AddContextTool, AddDecisionTool, AddNoteTool, CompleteTaskTool, CreateProjectTool,
    CreateTaskTool, GetActivityTool, GetProjectTool, GetTaskTool, ListProjectsTool,
    ListTasksTool, SearchTasksTool, StartTaskTool, StopTaskTool, UpdateProjectTool,
    UpdateTaskTool,
};
use super::memory_tools::{AnalyzeToolDiscoveriesTool, ListTemplatesTool, SearchKnowledgeTool};

/// One built-in tool: a typed input schema and an executor.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn input_schema(&self) -> Value;
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutcome>;
}

/// The fixed catalogue, keyed by tool name.
pub struct ToolRegistry {
    tools: HashMap<&'static str, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Builds the registry with every built-in tool registered.
    #[must_use]
    pub fn builtin() -> Self {
        let tools: Vec<Arc<dyn Tool>> = vec![
            Arc::new(CreateTaskTool),
            Arc::new(UpdateTaskTool),
            Arc::new(CompleteTaskTool),
            Arc::new(StartTaskTool),
            Arc::new(StopTaskTool),
            Arc::new(AddNoteTool),
            Arc::new(AddContextTool),
            Arc::new(AddDecisionTool),
            Arc::new(CreateProjectTool),
            Arc::new(UpdateProjectTool),
            Arc::new(GetTaskTool),
            Arc::new(GetProjectTool),
            Arc::new(ListTasksTool),
            Arc::new(ListProjectsTool),
            Arc::new(SearchTasksTool),
            Arc::new(GetActivityTool),
            Arc::new(SearchKnowledgeTool),
            Arc::new(ListTemplatesTool),
            Arc::new(AnalyzeToolDiscoveriesTool),
            Arc::new(ResolveDisambiguationTool),
        ];
        Self {
            tools: tools.into_iter().map(|t| (t.name(), t)).collect(),
        }
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// The catalogue as `ToolSpec`s for the LLM completion call, filtered to
    /// an enabled subset for this request (per-request enablement is a set
    /// filter, not a different registry).
    #[must_use]
    pub fn specs(&self, enabled: Option<&[&str]>) -> Vec<ToolSpec> {
        self.tools
            .values()
            .filter(|t| match enabled {
                Some(names) => names.contains(&t.name()),
                None => true,
            })
            .map(|t| ToolSpec {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
            })
            .collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

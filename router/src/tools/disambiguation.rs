//! Disambiguation tool: `resolve_disambiguation`.

use assistant_core::error::{Error, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use super::context::{ToolContext, ToolOutcome};
use super::registry::Tool;

/// Consumes a pending `SharedHandoff` addressed to this agent for this
/// session. A miss (already consumed, expired, or never created) is a race
/// outcome, not an error: the tool simply reports `resolved: false`.
pub struct ResolveDisambiguationTool;

#[async_trait]
impl Tool for ResolveDisambiguationTool {
    fn name(&self) -> &'static str {
        "resolve_disambiguation"
    }
    fn description(&self) -> &'static str {
        "Consume a pending disambiguation handoff for this session, if any"
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {"to_agent": {"type": "string"}},
            "required": ["to_agent"]
        })
    }
    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutcome> {
        let to_agent = args
            .get("to_agent")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Validation("resolve_disambiguation requires 'to_agent'".to_string()))?;
        let payload = ctx.memory.consume_pending(&ctx.session_id, to_agent);
        Ok(ToolOutcome::read_only(match payload {
            Some(p) => json!({"resolved": true, "payload": p}),
            None => json!({"resolved": false}),
        }))
    }
}

use async_trait::async_trait;
use serde_json::{json, Value};

use agentctl_broadcast::{BroadcastEvent, BroadcastFabric};
use agentctl_store::Store;

use crate::context::ToolContext;
use crate::handler::{error_result, ToolHandler};

/// Surfaces a curated highlight to the operator, distinct from the raw log.
pub struct NotableTool {
    store: Store,
    broadcast: BroadcastFabric,
}

impl NotableTool {
    pub fn new(store: Store, broadcast: BroadcastFabric) -> Self {
        Self { store, broadcast }
    }
}

#[async_trait]
impl ToolHandler for NotableTool {
    fn name(&self) -> &'static str {
        "notable"
    }

    fn schema(&self) -> Value {
        json!({
            "name": "notable",
            "description": "Surface a curated highlight to the operator.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "label": {"type": "string"},
                    "content": {"type": "string"},
                    "reason": {"type": "string"}
                },
                "required": ["label", "content"]
            }
        })
    }

    async fn call(&self, args: Value, _ctx: &ToolContext) -> String {
        let label = match args.get("label").and_then(Value::as_str) {
            Some(l) => l.to_string(),
            None => return error_result("missing required field: label"),
        };
        let content = match args.get("content").and_then(Value::as_str) {
            Some(c) => c.to_string(),
            None => return error_result("missing required field: content"),
        };
        let reason = args
            .get("reason")
            .and_then(Value::as_str)
            .map(str::to_string);

        match self.store.append_notable(label, content, reason, None).await {
            Ok(notable) => {
                let id = notable.id;
                self.broadcast.publish(BroadcastEvent::Notable(notable));
                format!("Recorded notable #{id}")
            }
            Err(e) => error_result(format!("storing notable: {e}")),
        }
    }
}

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use agentctl_core::types::TaskStatus;
use agentctl_store::Store;

use crate::context::ToolContext;
use crate::handler::{error_result, ToolHandler};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_WAIT_MS: u64 = 30_000;

fn task_envelope(task: &agentctl_core::types::BackgroundTask) -> Value {
    match task.status {
        TaskStatus::Running => json!({"status": "running", "task_id": task.id}),
        TaskStatus::Completed => {
            json!({"status": "completed", "task_id": task.id, "result": task.result})
        }
        TaskStatus::Failed => {
            json!({"status": "failed", "task_id": task.id, "error": task.error})
        }
    }
}

/// Returns the current status (and result/error, if terminal) of a
/// background task without blocking.
pub struct TaskStatusTool {
    store: Store,
}

impl TaskStatusTool {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ToolHandler for TaskStatusTool {
    fn name(&self) -> &'static str {
        "task_status"
    }

    fn schema(&self) -> Value {
        json!({
            "name": "task_status",
            "description": "Check the status of a background task without blocking.",
            "input_schema": {
                "type": "object",
                "properties": {"task_id": {"type": "string"}},
                "required": ["task_id"]
            }
        })
    }

    async fn call(&self, args: Value, _ctx: &ToolContext) -> String {
        let task_id = match args.get("task_id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => return error_result("missing required field: task_id"),
        };

        match self.store.get_task(task_id.clone()).await {
            Ok(Some(task)) => task_envelope(&task).to_string(),
            Ok(None) => error_result(format!("no such task: {task_id}")),
            Err(e) => error_result(format!("reading task: {e}")),
        }
    }
}

/// Polls a background task at ~100ms intervals until it reaches a terminal
/// state or `timeout_ms` elapses (default 30s), per §4.4.
pub struct TaskWaitTool {
    store: Store,
}

impl TaskWaitTool {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ToolHandler for TaskWaitTool {
    fn name(&self) -> &'static str {
        "task_wait"
    }

    fn schema(&self) -> Value {
        json!({
            "name": "task_wait",
            "description": "Block until a background task completes or a timeout elapses (default 30s).",
            "input_schema": {
                "type": "object",
                "properties": {
                    "task_id": {"type": "string"},
                    "timeout_ms": {"type": "integer"}
                },
                "required": ["task_id"]
            }
        })
    }

    async fn call(&self, args: Value, _ctx: &ToolContext) -> String {
        let task_id = match args.get("task_id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => return error_result("missing required field: task_id"),
        };
        let timeout_ms = args
            .get("timeout_ms")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_WAIT_MS);

        let deadline = tokio::time::Instant::now() + Duration::from_millis(timeout_ms);

        loop {
            match self.store.get_task(task_id.clone()).await {
                Ok(Some(task)) if task.status.is_terminal() => {
                    return task_envelope(&task).to_string();
                }
                Ok(Some(task)) => {
                    if tokio::time::Instant::now() >= deadline {
                        return task_envelope(&task).to_string();
                    }
                }
                Ok(None) => return error_result(format!("no such task: {task_id}")),
                Err(e) => return error_result(format!("reading task: {e}")),
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use agentctl_store::Store;

use crate::context::ToolContext;
use crate::handler::{is_error_result, ToolHandler};
use crate::json_repair::parse_tool_arguments;

/// Dispatches tool calls by name and turns `background`/`timeout` arguments
/// into the three uniform invocation modes described in §4.4.
pub struct Dispatcher {
    handlers: HashMap<&'static str, Arc<dyn ToolHandler>>,
    store: Store,
}

impl Dispatcher {
    pub fn new(store: Store) -> Self {
        Self {
            handlers: HashMap::new(),
            store,
        }
    }

    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        self.handlers.insert(handler.name(), handler);
    }

    pub fn schemas(&self) -> Vec<Value> {
        self.handlers.values().map(|h| h.schema()).collect()
    }

    /// Dispatch a tool call by name with raw (possibly malformed) JSON
    /// arguments. Unknown names return an error-string; they never raise.
    pub async fn dispatch(&self, name: &str, raw_args: &str, ctx: ToolContext) -> String {
        let handler = match self.handlers.get(name) {
            Some(h) => Arc::clone(h),
            None => return format!("Error: unknown tool: {name}"),
        };

        let mut args = parse_tool_arguments(raw_args);

        let background = args
            .get("background")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let timeout_ms = args.get("timeout").and_then(Value::as_u64);

        if let Some(obj) = args.as_object_mut() {
            obj.remove("background");
            obj.remove("timeout");
        }

        if background {
            self.dispatch_background(handler, name, args, ctx).await
        } else if let Some(timeout_ms) = timeout_ms {
            self.dispatch_timed(handler, name, args, ctx, timeout_ms).await
        } else {
            handler.call(args, &ctx).await
        }
    }

    async fn dispatch_background(
        &self,
        handler: Arc<dyn ToolHandler>,
        name: &str,
        args: Value,
        ctx: ToolContext,
    ) -> String {
        let task_id = match self.store.create_task(name.to_string(), args.clone()).await {
            Ok(id) => id,
            Err(e) => return format!("Error: creating background task: {e}"),
        };

        let store = self.store.clone();
        let id_for_task = task_id.clone();
        tokio::spawn(async move {
            let result = handler.call(args, &ctx).await;
            finalize_task(&store, id_for_task, result).await;
        });

        serde_json::json!({ "task_id": task_id }).to_string()
    }

    async fn dispatch_timed(
        &self,
        handler: Arc<dyn ToolHandler>,
        name: &str,
        args: Value,
        ctx: ToolContext,
        timeout_ms: u64,
    ) -> String {
        let task_id = match self.store.create_task(name.to_string(), args.clone()).await {
            Ok(id) => id,
            Err(e) => return format!("Error: creating background task: {e}"),
        };

        let store = self.store.clone();
        let id_for_task = task_id.clone();
        let (tx, rx) = tokio::sync::oneshot::channel();

        tokio::spawn(async move {
            let result = handler.call(args, &ctx).await;
            finalize_task(&store, id_for_task, result.clone()).await;
            // The receiver may already have timed out and been dropped; that
            // is expected, not an error — the task row is the durable result.
            let _ = tx.send(result);
        });

        match tokio::time::timeout(std::time::Duration::from_millis(timeout_ms), rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => format!("Error: background execution of {name} ended unexpectedly"),
            Err(_elapsed) => serde_json::json!({
                "task_id": task_id,
                "message": "Timeout exceeded, backgrounded"
            })
            .to_string(),
        }
    }
}

async fn finalize_task(store: &Store, id: String, result: String) {
    let outcome = if is_error_result(&result) {
        store.fail_task(id, result).await
    } else {
        store.complete_task(id, result).await
    };
    if let Err(e) = outcome {
        warn!("failed to persist background task completion: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::error_result;
    use async_trait::async_trait;
    use std::sync::Arc as StdArc;

    struct EchoTool;
    #[async_trait]
    impl ToolHandler for EchoTool {
        fn name(&self) -> &'static str {
            "echo"
        }
        fn schema(&self) -> Value {
            serde_json::json!({})
        }
        async fn call(&self, args: Value, _ctx: &ToolContext) -> String {
            args.get("text")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string()
        }
    }

    struct FailingTool;
    #[async_trait]
    impl ToolHandler for FailingTool {
        fn name(&self) -> &'static str {
            "failing"
        }
        fn schema(&self) -> Value {
            serde_json::json!({})
        }
        async fn call(&self, _args: Value, _ctx: &ToolContext) -> String {
            error_result("always fails")
        }
    }

    struct SlowTool;
    #[async_trait]
    impl ToolHandler for SlowTool {
        fn name(&self) -> &'static str {
            "slow"
        }
        fn schema(&self) -> Value {
            serde_json::json!({})
        }
        async fn call(&self, _args: Value, _ctx: &ToolContext) -> String {
            tokio::time::sleep(std::time::Duration::from_millis(150)).await;
            "done".to_string()
        }
    }

    fn ctx() -> ToolContext {
        ToolContext::new(std::env::temp_dir(), StdArc::new(|| false))
    }

    #[tokio::test]
    async fn unknown_tool_returns_error_never_panics() {
        let store = Store::open_in_memory().unwrap();
        let d = Dispatcher::new(store);
        let res = d.dispatch("nonexistent", "{}", ctx()).await;
        assert!(res.starts_with("Error:"));
    }

    #[tokio::test]
    async fn foreground_dispatch_returns_directly() {
        let store = Store::open_in_memory().unwrap();
        let mut d = Dispatcher::new(store);
        d.register(StdArc::new(EchoTool));
        let res = d.dispatch("echo", r#"{"text": "hi"}"#, ctx()).await;
        assert_eq!(res, "hi");
    }

    #[tokio::test]
    async fn background_dispatch_returns_task_id_immediately() {
        let store = Store::open_in_memory().unwrap();
        let mut d = Dispatcher::new(store.clone());
        d.register(StdArc::new(SlowTool));
        let res = d
            .dispatch("slow", r#"{"background": true}"#, ctx())
            .await;
        let v: Value = serde_json::from_str(&res).unwrap();
        let task_id = v["task_id"].as_str().unwrap().to_string();
        // completes shortly after
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        let task = store.get_task(task_id).await.unwrap().unwrap();
        assert_eq!(task.status, agentctl_core::types::TaskStatus::Completed);
        assert_eq!(task.result.as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn failing_tool_marks_task_failed() {
        let store = Store::open_in_memory().unwrap();
        let mut d = Dispatcher::new(store.clone());
        d.register(StdArc::new(FailingTool));
        let res = d
            .dispatch("failing", r#"{"background": true}"#, ctx())
            .await;
        let v: Value = serde_json::from_str(&res).unwrap();
        let task_id = v["task_id"].as_str().unwrap().to_string();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let task = store.get_task(task_id).await.unwrap().unwrap();
        assert_eq!(task.status, agentctl_core::types::TaskStatus::Failed);
    }

    #[tokio::test]
    async fn timed_dispatch_returns_result_when_fast_enough() {
        let store = Store::open_in_memory().unwrap();
        let mut d = Dispatcher::new(store);
        d.register(StdArc::new(EchoTool));
        let res = d
            .dispatch("echo", r#"{"text": "hi", "timeout": 1000}"#, ctx())
            .await;
        assert_eq!(res, "hi");
    }

    #[tokio::test]
    async fn timed_dispatch_backgrounds_on_timeout() {
        let store = Store::open_in_memory().unwrap();
        let mut d = Dispatcher::new(store.clone());
        d.register(StdArc::new(SlowTool));
        let res = d
            .dispatch("slow", r#"{"timeout": 10}"#, ctx())
            .await;
        let v: Value = serde_json::from_str(&res).unwrap();
        assert_eq!(v["message"], "Timeout exceeded, backgrounded");
        let task_id = v["task_id"].as_str().unwrap().to_string();
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        let task = store.get_task(task_id).await.unwrap().unwrap();
        assert_eq!(task.status, agentctl_core::types::TaskStatus::Completed);
    }
}

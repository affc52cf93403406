use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use crate::context::ToolContext;
use crate::handler::{error_result, ToolHandler};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Bounded blocking that cooperates with the interrupt probe: polls at a
/// sub-second cadence and returns early with a partial-completion message
/// the moment a user message is pending (§4.4, §8 property 9).
pub struct SleepTool;

#[async_trait]
impl ToolHandler for SleepTool {
    fn name(&self) -> &'static str {
        "sleep"
    }

    fn schema(&self) -> Value {
        json!({
            "name": "sleep",
            "description": "Pause for up to the given duration, or until a user message arrives.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "seconds": {"type": "number"}
                },
                "required": ["seconds"]
            }
        })
    }

    async fn call(&self, args: Value, ctx: &ToolContext) -> String {
        let seconds = match args.get("seconds").and_then(Value::as_f64) {
            Some(s) if s >= 0.0 => s,
            _ => return error_result("missing or invalid required field: seconds"),
        };

        let total = Duration::from_secs_f64(seconds);
        let mut elapsed = Duration::ZERO;

        while elapsed < total {
            if ctx.is_interrupted() {
                return format!(
                    "Sleep interrupted after {:.1}s (of {:.1}s requested): a user message is pending.",
                    elapsed.as_secs_f64(),
                    seconds
                );
            }
            let step = POLL_INTERVAL.min(total - elapsed);
            tokio::time::sleep(step).await;
            elapsed += step;
        }

        format!("Slept for {seconds:.1}s.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn completes_fully_when_never_interrupted() {
        let tool = SleepTool;
        let ctx = ToolContext::new(std::env::temp_dir(), Arc::new(|| false));
        let res = tool.call(json!({"seconds": 0.1}), &ctx).await;
        assert!(res.starts_with("Slept for"));
    }

    #[tokio::test]
    async fn returns_early_when_interrupted() {
        let flag = Arc::new(AtomicBool::new(true));
        let flag2 = Arc::clone(&flag);
        let tool = SleepTool;
        let ctx = ToolContext::new(
            std::env::temp_dir(),
            Arc::new(move || flag2.load(Ordering::SeqCst)),
        );
        let res = tool.call(json!({"seconds": 10.0}), &ctx).await;
        assert!(res.contains("interrupted"));
    }
}

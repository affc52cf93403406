use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command as AsyncCommand;

use crate::context::ToolContext;
use crate::handler::{error_result, ToolHandler};
use crate::safety;
use crate::truncate::{truncate_output, DEFAULT_MAX_CHARS};

/// Shell command execution confined to the workspace root and gated by the
/// safety blocklist (§4.4). Background/timed semantics are applied
/// uniformly by the dispatcher — this handler just runs to completion.
pub struct TerminalTool;

#[async_trait]
impl ToolHandler for TerminalTool {
    fn name(&self) -> &'static str {
        "terminal"
    }

    fn schema(&self) -> Value {
        json!({
            "name": "terminal",
            "description": "Run a shell command via `sh -c`, confined to the workspace root.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "command": {"type": "string"},
                    "cwd": {"type": "string", "description": "Optional working directory, relative to the workspace root."},
                    "background": {"type": "boolean"},
                    "timeout": {"type": "integer", "description": "Milliseconds."}
                },
                "required": ["command"]
            }
        })
    }

    async fn call(&self, args: Value, ctx: &ToolContext) -> String {
        let command = match args.get("command").and_then(Value::as_str) {
            Some(c) => c,
            None => return error_result("missing required field: command"),
        };

        if let Err(reason) = safety::check_command(command) {
            return error_result(format!("command blocked: {reason}"));
        }

        let cwd = match args.get("cwd").and_then(Value::as_str) {
            Some(raw) => match ctx.resolve_workspace_path(raw) {
                Ok(p) => p,
                Err(e) => return error_result(e),
            },
            None => ctx.workspace_root.clone(),
        };

        let output = AsyncCommand::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&cwd)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .output()
            .await;

        match output {
            Ok(output) => {
                let exit_code = output.status.code().unwrap_or(-1);
                let stdout = truncate_output(&String::from_utf8_lossy(&output.stdout), DEFAULT_MAX_CHARS);
                let stderr = truncate_output(&String::from_utf8_lossy(&output.stderr), DEFAULT_MAX_CHARS);
                if exit_code == 0 {
                    if stdout.is_empty() {
                        "(command completed with no output)".to_string()
                    } else {
                        stdout
                    }
                } else {
                    error_result(format!(
                        "command exited with code {exit_code}\nstdout:\n{stdout}\nstderr:\n{stderr}"
                    ))
                }
            }
            Err(e) => error_result(format!("spawn failed: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn ctx() -> ToolContext {
        ToolContext::new(std::env::temp_dir(), Arc::new(|| false))
    }

    #[tokio::test]
    async fn runs_a_safe_command() {
        let tool = TerminalTool;
        let res = tool.call(json!({"command": "echo hello"}), &ctx()).await;
        assert_eq!(res.trim(), "hello");
    }

    #[tokio::test]
    async fn blocked_command_returns_error_string() {
        let tool = TerminalTool;
        let res = tool.call(json!({"command": "rm -rf /"}), &ctx()).await;
        assert!(res.starts_with("Error:"));
    }
}

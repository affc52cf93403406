use async_trait::async_trait;
use serde_json::{json, Value};

use crate::context::ToolContext;
use crate::handler::{error_result, ToolHandler};
use crate::truncate::{truncate_output, DEFAULT_MAX_CHARS};

/// Maximum number of matching lines `search` returns.
const MAX_SEARCH_MATCHES: usize = 100;

/// Filesystem access confined to the configured workspace root: `list`,
/// `read`, `write`, `mkdir`, `delete`, `search` operations.
pub struct FilesystemTool;

#[async_trait]
impl ToolHandler for FilesystemTool {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    fn schema(&self) -> Value {
        json!({
            "name": "filesystem",
            "description": "Read, write, list, create, or delete files and directories under the agent workspace, or search file contents for a substring pattern.",
            "input_schema": {
                "type": "object",
                "properties": {
                    "operation": {"type": "string", "enum": ["list", "read", "write", "mkdir", "delete", "search"]},
                    "path": {"type": "string"},
                    "content": {"type": "string", "description": "Required for write."},
                    "pattern": {"type": "string", "description": "Required for search: substring to match (case-sensitive)."},
                    "file_pattern": {"type": "string", "description": "Optional for search: filename suffix filter, e.g. '.rs'."}
                },
                "required": ["operation", "path"]
            }
        })
    }

    async fn call(&self, args: Value, ctx: &ToolContext) -> String {
        let operation = match args.get("operation").and_then(Value::as_str) {
            Some(op) => op,
            None => return error_result("missing required field: operation"),
        };
        let path = match args.get("path").and_then(Value::as_str) {
            Some(p) => p,
            None => return error_result("missing required field: path"),
        };

        let resolved = match ctx.resolve_workspace_path(path) {
            Ok(p) => p,
            Err(e) => return error_result(e),
        };

        match operation {
            "list" => match tokio::fs::read_dir(&resolved).await {
                Ok(mut entries) => {
                    let mut names = Vec::new();
                    loop {
                        match entries.next_entry().await {
                            Ok(Some(entry)) => {
                                names.push(entry.file_name().to_string_lossy().into_owned())
                            }
                            Ok(None) => break,
                            Err(e) => return error_result(format!("listing {path}: {e}")),
                        }
                    }
                    names.sort();
                    names.join("\n")
                }
                Err(e) => error_result(format!("listing {path}: {e}")),
            },
            "read" => match tokio::fs::read_to_string(&resolved).await {
                Ok(content) => truncate_output(&content, DEFAULT_MAX_CHARS),
                Err(e) => error_result(format!("reading {path}: {e}")),
            },
            "write" => {
                let content = match args.get("content").and_then(Value::as_str) {
                    Some(c) => c,
                    None => return error_result("missing required field: content"),
                };
                if let Some(parent) = resolved.parent() {
                    if let Err(e) = tokio::fs::create_dir_all(parent).await {
                        return error_result(format!("creating parent directories for {path}: {e}"));
                    }
                }
                match tokio::fs::write(&resolved, content).await {
                    Ok(()) => format!("Wrote {} bytes to {path}", content.len()),
                    Err(e) => error_result(format!("writing {path}: {e}")),
                }
            }
            "mkdir" => match tokio::fs::create_dir_all(&resolved).await {
                Ok(()) => format!("Created directory {path}"),
                Err(e) => error_result(format!("creating {path}: {e}")),
            },
            "delete" => {
                let meta = tokio::fs::metadata(&resolved).await;
                let result = match meta {
                    Ok(m) if m.is_dir() => tokio::fs::remove_dir_all(&resolved).await,
                    Ok(_) => tokio::fs::remove_file(&resolved).await,
                    Err(e) => Err(e),
                };
                match result {
                    Ok(()) => format!("Deleted {path}"),
                    Err(e) => error_result(format!("deleting {path}: {e}")),
                }
            }
            "search" => {
                let pattern = match args.get("pattern").and_then(Value::as_str) {
                    Some(p) => p,
                    None => return error_result("missing required field: pattern"),
                };
                let file_pattern = args.get("file_pattern").and_then(Value::as_str);

                let mut matches: Vec<String> = Vec::new();
                let mut truncated = false;
                search_dir(&resolved, &resolved, path, pattern, file_pattern, &mut matches, &mut truncated);

                if matches.is_empty() {
                    return "No matches found.".to_string();
                }
                let mut output = matches.join("\n");
                if truncated {
                    output.push_str(&format!("\n\n[truncated at {MAX_SEARCH_MATCHES} matches]"));
                }
                truncate_output(&output, DEFAULT_MAX_CHARS)
            }
            other => error_result(format!("unknown filesystem operation: {other}")),
        }
    }
}

/// Recursively walk `dir` (confined under `root`), collecting substring
/// matches. `display_prefix` is the user-supplied search path, used to
/// render match locations relative to the tool's own `path` argument
/// instead of the resolved on-disk root.
fn search_dir(
    root: &std::path::Path,
    dir: &std::path::Path,
    display_prefix: &str,
    pattern: &str,
    file_pattern: Option<&str>,
    matches: &mut Vec<String>,
    truncated: &mut bool,
) {
    let read_dir = match std::fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(_) => return,
    };

    let mut entries: Vec<std::path::PathBuf> = read_dir.filter_map(|e| e.ok()).map(|e| e.path()).collect();
    entries.sort();

    for entry in entries {
        if *truncated {
            return;
        }
        if entry.file_name().map(|n| n == ".git").unwrap_or(false) {
            continue;
        }
        if entry.is_dir() {
            search_dir(root, &entry, display_prefix, pattern, file_pattern, matches, truncated);
        } else if entry.is_file() {
            if let Some(fp) = file_pattern {
                if !entry.to_string_lossy().ends_with(fp) {
                    continue;
                }
            }
            let relative = entry.strip_prefix(root).unwrap_or(&entry).to_string_lossy();
            let display_path = format!("{}/{}", display_prefix.trim_end_matches('/'), relative);
            search_file(&entry, &display_path, pattern, matches, truncated);
        }
    }
}

/// Search a single file for `pattern`, appending `path:line: content` hits.
fn search_file(path: &std::path::Path, display_path: &str, pattern: &str, matches: &mut Vec<String>, truncated: &mut bool) {
    let content = match std::fs::read(path) {
        Ok(b) => b,
        Err(_) => return,
    };

    let probe = &content[..content.len().min(8192)];
    if probe.contains(&0u8) {
        return;
    }
    let text = match std::str::from_utf8(&content) {
        Ok(t) => t,
        Err(_) => return,
    };

    for (line_idx, line) in text.lines().enumerate() {
        if *truncated {
            return;
        }
        if line.contains(pattern) {
            matches.push(format!("{display_path}:{}: {line}", line_idx + 1));
            if matches.len() >= MAX_SEARCH_MATCHES {
                *truncated = true;
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn ctx(root: &std::path::Path) -> ToolContext {
        ToolContext::new(root.to_path_buf(), Arc::new(|| false))
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempdir();
        let tool = FilesystemTool;
        let ctx = ctx(dir.path());
        let write_res = tool
            .call(
                json!({"operation": "write", "path": "a.txt", "content": "hello"}),
                &ctx,
            )
            .await;
        assert!(write_res.starts_with("Wrote"));
        let read_res = tool.call(json!({"operation": "read", "path": "a.txt"}), &ctx).await;
        assert_eq!(read_res, "hello");
    }

    #[tokio::test]
    async fn search_finds_matching_lines_across_files() {
        let dir = tempdir();
        let tool = FilesystemTool;
        let ctx = ctx(dir.path());
        tool.call(json!({"operation": "write", "path": "a.txt", "content": "alpha\nneedle here\n"}), &ctx).await;
        tool.call(json!({"operation": "write", "path": "sub/b.txt", "content": "nothing\n"}), &ctx).await;

        let res = tool.call(json!({"operation": "search", "path": ".", "pattern": "needle"}), &ctx).await;
        assert!(res.contains("a.txt:2: needle here"), "unexpected result: {res}");
        assert!(!res.contains("b.txt"));
    }

    #[tokio::test]
    async fn search_with_no_matches_reports_none_found() {
        let dir = tempdir();
        let tool = FilesystemTool;
        let ctx = ctx(dir.path());
        let res = tool.call(json!({"operation": "search", "path": ".", "pattern": "absent"}), &ctx).await;
        assert_eq!(res, "No matches found.");
    }

    #[tokio::test]
    async fn escape_attempt_is_rejected() {
        let dir = tempdir();
        let tool = FilesystemTool;
        let ctx = ctx(dir.path());
        let res = tool
            .call(json!({"operation": "read", "path": "../../etc/passwd"}), &ctx)
            .await;
        assert!(res.starts_with("Error:"));
    }

    fn tempdir() -> TempDirGuard {
        let mut path = std::env::temp_dir();
        path.push(format!("agentctl-fs-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&path).unwrap();
        TempDirGuard(path)
    }

    struct TempDirGuard(std::path::PathBuf);
    impl TempDirGuard {
        fn path(&self) -> &std::path::Path {
            &self.0
        }
    }
    impl Drop for TempDirGuard {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }
}

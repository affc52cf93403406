use std::path::PathBuf;
use std::sync::Arc;

/// Capability passed to every tool handler: cheap to call, `true` when a
/// user input is currently pending (§4.4, §5). Tools that perform bounded
/// blocking must poll this at sub-second cadence.
pub type InterruptProbe = Arc<dyn Fn() -> bool + Send + Sync>;

/// Per-invocation context shared by all tool handlers.
#[derive(Clone)]
pub struct ToolContext {
    pub interrupt: InterruptProbe,
    pub workspace_root: PathBuf,
    pub http: reqwest::Client,
    pub search_api_key: Option<String>,
}

impl ToolContext {
    pub fn new(workspace_root: PathBuf, interrupt: InterruptProbe) -> Self {
        Self {
            interrupt,
            workspace_root,
            http: reqwest::Client::new(),
            search_api_key: None,
        }
    }

    pub fn with_search_api_key(mut self, key: Option<String>) -> Self {
        self.search_api_key = key;
        self
    }

    pub fn is_interrupted(&self) -> bool {
        (self.interrupt)()
    }

    /// Resolve `path` against the workspace root and reject escapes.
    /// Both absolute and relative inputs are accepted; the result is always
    /// required to stay under the root.
    pub fn resolve_workspace_path(&self, path: &str) -> Result<PathBuf, String> {
        let candidate = if path.is_empty() || path == "." {
            self.workspace_root.clone()
        } else {
            let p = PathBuf::from(path);
            if p.is_absolute() {
                p
            } else {
                self.workspace_root.join(p)
            }
        };

        let root = normalize(&self.workspace_root);
        let target = normalize(&candidate);

        if target.starts_with(&root) {
            Ok(target)
        } else {
            Err(format!(
                "path escapes workspace root: {} is not under {}",
                candidate.display(),
                self.workspace_root.display()
            ))
        }
    }
}

/// Lexical normalisation (no filesystem access required, so it works for
/// paths that don't exist yet, e.g. a file about to be written).
fn normalize(path: &std::path::Path) -> PathBuf {
    use std::path::Component;
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ToolContext {
        ToolContext::new(PathBuf::from("/workspace"), Arc::new(|| false))
    }

    #[test]
    fn relative_path_resolves_under_root() {
        let ctx = ctx();
        let resolved = ctx.resolve_workspace_path("notes.txt").unwrap();
        assert_eq!(resolved, PathBuf::from("/workspace/notes.txt"));
    }

    #[test]
    fn traversal_is_rejected() {
        let ctx = ctx();
        assert!(ctx.resolve_workspace_path("../etc/passwd").is_err());
    }

    #[test]
    fn absolute_escape_is_rejected() {
        let ctx = ctx();
        assert!(ctx.resolve_workspace_path("/etc/passwd").is_err());
    }

    #[test]
    fn absolute_path_under_root_is_accepted() {
        let ctx = ctx();
        assert!(ctx.resolve_workspace_path("/workspace/sub/file.txt").is_ok());
    }
}

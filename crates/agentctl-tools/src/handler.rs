use async_trait::async_trait;
use serde_json::Value;

use crate::context::ToolContext;

/// The one contract every tool implements: given arguments and a context
/// carrying the interrupt probe, return a text result or an
/// `Error:`-prefixed string. Never panics, never returns a typed error — the
/// dispatcher and the Model both only ever see text (§4.4).
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// JSON schema describing this tool's arguments, colocated with the
    /// handler so advertisement and implementation can't drift apart (§9).
    fn schema(&self) -> Value;

    async fn call(&self, args: Value, ctx: &ToolContext) -> String;
}

pub fn error_result(msg: impl std::fmt::Display) -> String {
    format!("Error: {msg}")
}

pub fn is_error_result(result: &str) -> bool {
    result.starts_with("Error:")
}

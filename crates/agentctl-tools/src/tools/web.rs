use async_trait::async_trait;
use serde_json::{json, Value};

use crate::context::ToolContext;
use crate::handler::{error_result, ToolHandler};
use crate::truncate::{truncate_output, DEFAULT_MAX_CHARS};

/// Fetches a URL over HTTP(S) and returns the response body as text.
pub struct WebFetchTool;

#[async_trait]
impl ToolHandler for WebFetchTool {
    fn name(&self) -> &'static str {
        "web_fetch"
    }

    fn schema(&self) -> Value {
        json!({
            "name": "web_fetch",
            "description": "Fetch a URL and return its body as text.",
            "input_schema": {
                "type": "object",
                "properties": {"url": {"type": "string"}},
                "required": ["url"]
            }
        })
    }

    async fn call(&self, args: Value, ctx: &ToolContext) -> String {
        let url = match args.get("url").and_then(Value::as_str) {
            Some(u) => u,
            None => return error_result("missing required field: url"),
        };

        match ctx.http.get(url).send().await {
            Ok(resp) => {
                let status = resp.status();
                match resp.text().await {
                    Ok(body) => {
                        if status.is_success() {
                            truncate_output(&body, DEFAULT_MAX_CHARS)
                        } else {
                            error_result(format!("{status}: {}", truncate_output(&body, 2000)))
                        }
                    }
                    Err(e) => error_result(format!("reading response body: {e}")),
                }
            }
            Err(e) => error_result(format!("fetching {url}: {e}")),
        }
    }
}

/// Web search, gated on `search_api_key` being configured (§6).
pub struct WebSearchTool;

#[async_trait]
impl ToolHandler for WebSearchTool {
    fn name(&self) -> &'static str {
        "web_search"
    }

    fn schema(&self) -> Value {
        json!({
            "name": "web_search",
            "description": "Search the web and return a list of results.",
            "input_schema": {
                "type": "object",
                "properties": {"query": {"type": "string"}},
                "required": ["query"]
            }
        })
    }

    async fn call(&self, args: Value, ctx: &ToolContext) -> String {
        let query = match args.get("query").and_then(Value::as_str) {
            Some(q) => q,
            None => return error_result("missing required field: query"),
        };

        let api_key = match &ctx.search_api_key {
            Some(key) => key,
            None => return error_result("web_search is not enabled: no search_api_key configured"),
        };

        let resp = ctx
            .http
            .get("https://api.search.brave.com/res/v1/web/search")
            .query(&[("q", query)])
            .header("X-Subscription-Token", api_key)
            .header("Accept", "application/json")
            .send()
            .await;

        match resp {
            Ok(resp) => match resp.text().await {
                Ok(body) => truncate_output(&body, DEFAULT_MAX_CHARS),
                Err(e) => error_result(format!("reading search response: {e}")),
            },
            Err(e) => error_result(format!("search request failed: {e}")),
        }
    }
}

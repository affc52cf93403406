use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{CoreError, Result};

pub const DEFAULT_LISTEN_PORT: u16 = 8787;
pub const DEFAULT_CONTEXT_SIZE: u64 = 128_000;

/// Recognised configuration surface (§6). Loaded from `agentctl.toml` plus
/// `AGENTCTL_*` environment overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the OpenAI-compatible chat-completions endpoint.
    #[serde(default = "default_model_endpoint")]
    pub model_endpoint: String,

    /// Model identifier passed to the endpoint.
    #[serde(default = "default_model_name")]
    pub model_name: String,

    /// Enables the web-search tool when present.
    pub search_api_key: Option<String>,

    /// Port the Gateway binds.
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Filesystem root the filesystem/terminal tools are confined to, and
    /// parent of the durable store.
    #[serde(default = "default_workspace_path")]
    pub workspace_path: String,

    /// Token capacity used as the denominator for pressure.
    #[serde(default = "default_context_size")]
    pub context_size: u64,

    /// Optional operator-supplied system prompt file; falls back to the
    /// built-in default.
    pub system_prompt_path: Option<String>,

    /// Optional operator-supplied autonomous-nudge prompt file; falls back
    /// to the built-in default.
    pub autonomous_prompt_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_endpoint: default_model_endpoint(),
            model_name: default_model_name(),
            search_api_key: None,
            listen_port: default_listen_port(),
            workspace_path: default_workspace_path(),
            context_size: default_context_size(),
            system_prompt_path: None,
            autonomous_prompt_path: None,
        }
    }
}

fn default_model_endpoint() -> String {
    "http://localhost:11434/v1".to_string()
}
fn default_model_name() -> String {
    "llama3.1".to_string()
}
fn default_listen_port() -> u16 {
    DEFAULT_LISTEN_PORT
}
fn default_context_size() -> u64 {
    DEFAULT_CONTEXT_SIZE
}
fn default_workspace_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.agentctl/workspace")
}

impl Config {
    /// Load config from a TOML file with `AGENTCTL_*` env var overrides.
    ///
    /// Checks, in order: the explicit path argument, then
    /// `~/.agentctl/agentctl.toml`, falling back to built-in defaults for any
    /// option the file and environment both omit.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: Config = Figment::from(figment::providers::Serialized::defaults(
            Config::default(),
        ))
        .merge(Toml::file(&path))
        .merge(Env::prefixed("AGENTCTL_"))
        .extract()
        .map_err(|e| CoreError::Config(e.to_string()))?;

        Ok(config)
    }

    pub fn store_path(&self) -> String {
        format!("{}/agentctl.db", self.workspace_path.trim_end_matches('/'))
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{home}/.agentctl/agentctl.toml")
}

/// Substitute `{{var}}` placeholders in a prompt template.
///
/// Recognised variables: `port`, `workspace`, `ollama_endpoint`,
/// `ollama_model`, `context_size`. Unknown `{{var}}` placeholders are left
/// untouched so a template typo is visible rather than silently dropped.
pub fn render_prompt_template(template: &str, vars: &HashMap<&str, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        if let Some(end) = after.find("}}") {
            let key = after[..end].trim();
            match vars.get(key) {
                Some(value) => out.push_str(value),
                None => {
                    out.push_str("{{");
                    out.push_str(key);
                    out.push_str("}}");
                }
            }
            rest = &after[end + 2..];
        } else {
            out.push_str("{{");
            rest = after;
        }
    }
    out.push_str(rest);
    out
}

/// Build the standard substitution table for prompt templates from a config.
pub fn prompt_vars(config: &Config) -> HashMap<&'static str, String> {
    let mut vars = HashMap::new();
    vars.insert("port", config.listen_port.to_string());
    vars.insert("workspace", config.workspace_path.clone());
    vars.insert("ollama_endpoint", config.model_endpoint.clone());
    vars.insert("ollama_model", config.model_name.clone());
    vars.insert("context_size", config.context_size.to_string());
    vars
}

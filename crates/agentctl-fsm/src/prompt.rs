//! Built-in default prompts and operator-overridable prompt loading (§6
//! "Configuration surface").

use std::collections::HashMap;

use agentctl_core::config::{render_prompt_template, Config};

const DEFAULT_SYSTEM_PROMPT: &str = r#"You are the resident agent running on this host, listening on port {{port}}.
Your workspace is {{workspace}}; filesystem and terminal tools are confined to it.
You are talking to the model {{ollama_model}} at {{ollama_endpoint}} with a context budget of {{context_size}} tokens.
Use tools to act; be direct and terse in conversation."#;

const DEFAULT_AUTONOMOUS_PROMPT: &str = r#"[System: autonomous tick. No new user message is pending.
Continue whatever you judge most useful, or call the sleep tool if there is nothing to do right now.]"#;

pub fn load_system_prompt(config: &Config) -> std::io::Result<String> {
    load_prompt(config, config.system_prompt_path.as_deref(), DEFAULT_SYSTEM_PROMPT)
}

pub fn load_autonomous_prompt(config: &Config) -> std::io::Result<String> {
    load_prompt(config, config.autonomous_prompt_path.as_deref(), DEFAULT_AUTONOMOUS_PROMPT)
}

fn load_prompt(config: &Config, path: Option<&str>, default: &str) -> std::io::Result<String> {
    let template = match path {
        Some(p) => std::fs::read_to_string(p)?,
        None => default.to_string(),
    };
    let vars: HashMap<&str, String> = agentctl_core::config::prompt_vars(config);
    Ok(render_prompt_template(&template, &vars))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_system_prompt_substitutes_config_vars() {
        let config = Config { listen_port: 9100, ..Config::default() };
        let rendered = load_system_prompt(&config).unwrap();
        assert!(rendered.contains("9100"));
        assert!(!rendered.contains("{{port}}"));
    }
}

//! Process configuration, layered from an optional `chainreview.toml` in
//! the repo root plus environment variable overrides. Every field is
//! `#[serde(default)]` so a missing or partial file still parses.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub mcp: McpConfig,
    #[serde(default)]
    pub limits: Limits,
}

impl Config {
    /// Load `<repo_root>/chainreview.toml` if present, falling back to
    /// defaults when absent or unparseable (a malformed config file is a
    /// startup-time concern, not a reason to fail every subsequent call).
    pub fn load(repo_root: &std::path::Path) -> Self {
        let path = repo_root.join("chainreview.toml");
        let Ok(raw) = std::fs::read_to_string(&path) else {
            return Self::default();
        };
        match toml::from_str(&raw) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to parse chainreview.toml, using defaults");
                Self::default()
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "d_provider")]
    pub provider: String,
    #[serde(default = "d_model")]
    pub model: String,
    /// Name of the environment variable holding the API key. Never the key
    /// itself, never persisted to disk.
    #[serde(default = "d_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self { provider: d_provider(), model: d_model(), api_key_env: d_api_key_env(), base_url: None }
    }
}

fn d_provider() -> String { "anthropic".into() }
fn d_model() -> String { "claude-sonnet-4-20250514".into() }
fn d_api_key_env() -> String { "ANTHROPIC_API_KEY".into() }

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolsConfig {
    /// Extra exec basenames allowed beyond the fixed built-in allowlist.
    #[serde(default)]
    pub extra_allowed_commands: Vec<String>,
    #[serde(default)]
    pub web_search_enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct McpConfig {
    #[serde(default)]
    pub servers: Vec<McpServerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub id: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Limits {
    #[serde(default = "d_long_deadline")]
    pub long_request_deadline_secs: u64,
    #[serde(default = "d_short_deadline")]
    pub short_request_deadline_secs: u64,
    #[serde(default = "d_max_event_bytes")]
    pub max_event_payload_bytes: usize,
    #[serde(default = "d_tool_result_summary_bytes")]
    pub tool_result_summary_bytes: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            long_request_deadline_secs: d_long_deadline(),
            short_request_deadline_secs: d_short_deadline(),
            max_event_payload_bytes: d_max_event_bytes(),
            tool_result_summary_bytes: d_tool_result_summary_bytes(),
        }
    }
}

fn d_long_deadline() -> u64 { 600 }
fn d_short_deadline() -> u64 { 120 }
fn d_max_event_bytes() -> usize { 64 * 1024 }
fn d_tool_result_summary_bytes() -> usize { 300 }

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_limits() {
        let cfg = Config::default();
        assert_eq!(cfg.limits.long_request_deadline_secs, 600);
        assert_eq!(cfg.limits.short_request_deadline_secs, 120);
        assert_eq!(cfg.llm.api_key_env, "ANTHROPIC_API_KEY");
    }

    #[test]
    fn parses_partial_toml() {
        let raw = r#"
            [llm]
            model = "claude-opus-4"
        "#;
        let cfg: Config = toml::from_str(raw).unwrap();
        assert_eq!(cfg.llm.model, "claude-opus-4");
        assert_eq!(cfg.llm.provider, "anthropic");
    }
}

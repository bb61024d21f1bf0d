//! Tool registry: builds the tool definitions exposed to an agent and
//! dispatches a tool call by name to the concrete handler.

use std::path::Path;

use serde_json::Value;

use chainreview_domain::config::Config;
use chainreview_domain::message::ToolDefinition;
use chainreview_domain::model::Patch;

use crate::{code_tools, exec_tool, patch_tools, repo_tools, scratch, web_tool};

/// Build the tool definitions available for a run, given the active config.
/// `web_search` is only included when enabled and an API key is present.
pub fn build_tool_definitions(config: &Config) -> Vec<ToolDefinition> {
    let mut defs = vec![
        ToolDefinition {
            name: "repo.open".into(),
            description: "Select a repository root and report its name and current branch.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": { "path": { "type": "string" } },
                "required": []
            }),
        },
        ToolDefinition {
            name: "repo.tree".into(),
            description: "List files in the repository, optionally filtered by a glob pattern.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": { "pattern": { "type": "string" } },
                "required": []
            }),
        },
        ToolDefinition {
            name: "repo.file".into(),
            description: "Read a file, or a line range within it.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string" },
                    "start_line": { "type": "integer" },
                    "end_line": { "type": "integer" }
                },
                "required": ["path"]
            }),
        },
        ToolDefinition {
            name: "repo.search".into(),
            description: "Regex search across the repository, optionally scoped by a glob.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "pattern": { "type": "string" },
                    "glob": { "type": "string" }
                },
                "required": ["pattern"]
            }),
        },
        ToolDefinition {
            name: "repo.diff".into(),
            description: "Produce a unified diff between two refs, or the working tree diff.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "ref_a": { "type": "string" },
                    "ref_b": { "type": "string" }
                },
                "required": []
            }),
        },
        ToolDefinition {
            name: "code.import_graph".into(),
            description: "Build a best-effort import/dependency adjacency list for the repo or a subpath.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": { "path": { "type": "string" } },
                "required": []
            }),
        },
        ToolDefinition {
            name: "code.pattern_scan".into(),
            description: "Scan the repo for a structural or textual pattern.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": { "pattern": { "type": "string" } },
                "required": ["pattern"]
            }),
        },
        ToolDefinition {
            name: "exec_command".into(),
            description: "Run an allowlisted read-only command in the repo root.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": { "cmd": { "type": "string" } },
                "required": ["cmd"]
            }),
        },
        ToolDefinition {
            name: "patch.propose".into(),
            description: "Propose a patch: the original snippet must occur exactly once in the target file.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "finding_id": { "type": "string" },
                    "file": { "type": "string" },
                    "original": { "type": "string" },
                    "replacement": { "type": "string" },
                    "description": { "type": "string" }
                },
                "required": ["finding_id", "file", "original", "replacement"]
            }),
        },
        ToolDefinition {
            name: "patch.validate".into(),
            description: "Pre-apply dry run: check that a proposed patch's original snippet still anchors exactly once before applying it.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": { "patch": { "type": "object" } },
                "required": ["patch"]
            }),
        },
        ToolDefinition {
            name: "patch.apply".into(),
            description: "Write a proposed patch to disk, after re-validating the single-occurrence invariant.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": { "patch": { "type": "object" } },
                "required": ["patch"]
            }),
        },
    ];

    if config.tools.web_search_enabled && web_tool::is_available() {
        defs.push(ToolDefinition {
            name: "web_search".into(),
            description: "Search the web for a query and return a list of hits.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": { "query": { "type": "string" } },
                "required": ["query"]
            }),
        });
    }

    defs
}

/// Dispatch a single tool call by name. Returns `(result_json, is_error)`;
/// tool-level errors are surfaced as a structured result, not propagated,
/// so the calling agent can see and react to them.
pub async fn dispatch_tool(repo_root: &Path, config: &Config, tool_name: &str, arguments: &Value) -> (String, bool) {
    match tool_name {
        "repo.open" => to_tool_result(repo_tools::repo_open(repo_root).await),
        "repo.tree" => {
            let pattern = arguments.get("pattern").and_then(|v| v.as_str());
            to_tool_result(repo_tools::repo_tree(repo_root, pattern))
        }
        "repo.file" => {
            let path = arguments.get("path").and_then(|v| v.as_str()).unwrap_or("");
            let start_line = arguments.get("start_line").and_then(|v| v.as_u64()).map(|n| n as u32);
            let end_line = arguments.get("end_line").and_then(|v| v.as_u64()).map(|n| n as u32);
            to_tool_result(repo_tools::repo_file(repo_root, path, start_line, end_line).await)
        }
        "repo.search" => {
            let pattern = arguments.get("pattern").and_then(|v| v.as_str()).unwrap_or("");
            let glob = arguments.get("glob").and_then(|v| v.as_str());
            to_tool_result(repo_tools::repo_search(repo_root, pattern, glob))
        }
        "repo.diff" => {
            let ref_a = arguments.get("ref_a").and_then(|v| v.as_str());
            let ref_b = arguments.get("ref_b").and_then(|v| v.as_str());
            to_tool_result(repo_tools::repo_diff(repo_root, ref_a, ref_b).await)
        }
        "code.import_graph" => {
            let path = arguments.get("path").and_then(|v| v.as_str());
            to_tool_result(code_tools::import_graph(repo_root, path))
        }
        "code.pattern_scan" => {
            let pattern = arguments.get("pattern").and_then(|v| v.as_str()).unwrap_or("");
            to_tool_result(code_tools::pattern_scan(repo_root, pattern))
        }
        "exec_command" => {
            let cmd = arguments.get("cmd").and_then(|v| v.as_str()).unwrap_or("");
            to_tool_result(exec_tool::exec_command(repo_root, cmd, &config.tools.extra_allowed_commands).await)
        }
        "patch.propose" => {
            let finding_id = arguments.get("finding_id").and_then(|v| v.as_str()).unwrap_or("");
            let file = arguments.get("file").and_then(|v| v.as_str()).unwrap_or("");
            let original = arguments.get("original").and_then(|v| v.as_str()).unwrap_or("");
            let replacement = arguments.get("replacement").and_then(|v| v.as_str()).unwrap_or("");
            to_tool_result(patch_tools::propose(repo_root, finding_id, file, original, replacement).await)
        }
        "patch.validate" => match parse_patch(arguments) {
            Ok(patch) => to_tool_result(patch_tools::validate(repo_root, &patch).await),
            Err(e) => (e, true),
        },
        "patch.apply" => match parse_patch(arguments) {
            Ok(patch) => to_tool_result(patch_tools::apply(repo_root, &patch).await.map(|_| "applied")),
            Err(e) => (e, true),
        },
        "web_search" => {
            let query = arguments.get("query").and_then(|v| v.as_str()).unwrap_or("");
            to_tool_result(web_tool::web_search(query).await)
        }
        other => (format!("unknown tool '{other}'"), true),
    }
}

fn parse_patch(arguments: &Value) -> Result<Patch, String> {
    let raw = arguments.get("patch").cloned().unwrap_or(Value::Null);
    serde_json::from_value(raw).map_err(|e| format!("invalid patch argument: {e}"))
}

fn to_tool_result<T: serde::Serialize>(result: chainreview_domain::error::Result<T>) -> (String, bool) {
    match result {
        Ok(value) => (serde_json::to_string(&value).unwrap_or_else(|_| "null".into()), false),
        Err(e) => (e.human_message(), true),
    }
}

/// Export a finding's fix prompt to the repo's scratch area.
pub async fn export_fix_prompt(repo_root: &Path, finding_id: &str, contents: &str) -> (String, bool) {
    match scratch::export_fix_prompt(repo_root, finding_id, contents).await {
        Ok(path) => (path.display().to_string(), false),
        Err(e) => (e.human_message(), true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definitions_omit_web_search_when_disabled() {
        let config = Config::default();
        let defs = build_tool_definitions(&config);
        assert!(!defs.iter().any(|d| d.name == "web_search"));
        assert!(defs.iter().any(|d| d.name == "repo.open"));
    }

    #[tokio::test]
    async fn dispatch_unknown_tool_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        let (result, is_error) = dispatch_tool(dir.path(), &config, "nonsense", &serde_json::json!({})).await;
        assert!(is_error);
        assert!(result.contains("unknown tool"));
    }

    #[tokio::test]
    async fn dispatch_repo_tree_round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.rs"), "").unwrap();
        let config = Config::default();
        let (result, is_error) = dispatch_tool(dir.path(), &config, "repo.tree", &serde_json::json!({})).await;
        assert!(!is_error);
        assert!(result.contains("a.rs"));
    }
}

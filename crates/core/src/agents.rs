//! The fixed agent roster: compiled-in system prompts and tool subsets for
//! each member of [`AgentName`]. Unlike a config-driven registry, the set of
//! agents here is closed — see the grounding ledger for why.

use chainreview_domain::config::Config;
use chainreview_domain::message::ToolDefinition;
use chainreview_domain::model::AgentName;
use chainreview_mcp::McpManager;

const ARCHITECTURE_PROMPT: &str = "\
You are the architecture reviewer in a multi-agent code review system. Inspect the \
repository's module boundaries, dependency direction, and structural coupling. Use the \
read-only repo tools to gather evidence before forming conclusions; never guess at file \
contents you have not read.

When you are done, emit your findings as a single fenced block:

```findings
[{\"category\":\"architecture\",\"severity\":\"medium\",\"title\":\"...\",\"description\":\"...\",\"confidence\":0.8,\"evidence\":[{\"file_path\":\"src/lib.rs\",\"start_line\":1,\"end_line\":5,\"snippet\":\"...\"}]}]
```

Only emit findings you have concrete evidence for. An empty array is a valid result.";

const SECURITY_PROMPT: &str = "\
You are the security reviewer. Look for injection points, unsafe deserialization, path \
traversal, credential handling mistakes, and missing input validation. `exec_command` is \
available for `grep`/`rg`/`semgrep` scans; do not attempt to run anything else.

Emit findings in the same fenced `findings` JSON block format used by the rest of the \
review fleet (category `security`). An empty array is a valid result.";

const BUGS_PROMPT: &str = "\
You are the bugs reviewer. Look for logic errors, off-by-one mistakes, incorrect error \
handling, and resource leaks. Read enough of the surrounding code to be sure before citing \
evidence.

Emit findings in the same fenced `findings` JSON block format used by the rest of the \
review fleet (category `bugs`). An empty array is a valid result.";

const EXPLAINER_PROMPT: &str = "\
You are the chat assistant for a code review session. Answer the developer's question \
using the repository context and any prior findings provided to you. You do not emit \
findings yourself. If the developer's question calls for a fresh review pass over the \
repository rather than just an explanation, call `spawn_review` instead of trying to \
review the whole codebase in your answer.";

const VALIDATOR_PROMPT: &str = "\
You are the validator agent. Given a previously reported finding, check whether its issue \
is still present in the current state of the code. Read the cited evidence location and, \
if useful, search for related occurrences.

End your answer with a line of the exact form:

VERDICT: <still_present|partially_fixed|fixed|unable_to_determine>

followed by a short paragraph of reasoning.";

const PATCH_GENERATOR_PROMPT: &str = "\
You write minimal patches for a single finding. Given the finding and its cited evidence, \
respond with exactly one fenced block:

```patch
{\"original\": \"<verbatim text to replace, copied from the snippet>\", \"replacement\": \"<replacement text>\"}
```

`original` must match the cited snippet exactly so it can be located unambiguously in the \
file. Do not explain your reasoning outside the block.";

pub fn system_prompt(agent: AgentName) -> String {
    match agent {
        AgentName::Architecture => ARCHITECTURE_PROMPT,
        AgentName::Security => SECURITY_PROMPT,
        AgentName::Bugs => BUGS_PROMPT,
        AgentName::Explainer => EXPLAINER_PROMPT,
        AgentName::Validator => VALIDATOR_PROMPT,
        AgentName::System => "",
    }
    .to_string()
}

pub fn patch_generator_prompt() -> String {
    PATCH_GENERATOR_PROMPT.to_string()
}

fn allowed_tool_names(agent: AgentName) -> &'static [&'static str] {
    match agent {
        AgentName::Architecture => &[
            "repo.open", "repo.tree", "repo.file", "repo.search", "repo.diff",
            "code.import_graph", "code.pattern_scan",
        ],
        AgentName::Security => &[
            "repo.open", "repo.tree", "repo.file", "repo.search", "repo.diff",
            "code.import_graph", "code.pattern_scan", "exec_command", "web_search",
        ],
        AgentName::Bugs => &[
            "repo.open", "repo.tree", "repo.file", "repo.search", "repo.diff",
            "code.import_graph", "code.pattern_scan", "exec_command",
        ],
        AgentName::Explainer => &["repo.open", "repo.tree", "repo.file", "repo.search", "repo.diff"],
        AgentName::Validator => &["repo.open", "repo.tree", "repo.file", "repo.search", "repo.diff", "exec_command"],
        AgentName::System => &[],
    }
}

/// The tool definitions a given agent is allowed to call: its fixed subset
/// of the core registry, plus every tool exposed by a live MCP server
/// (auxiliary tool sources aren't part of the per-agent allowlist since
/// their names are only known once a server's config is loaded). Only
/// `System` — which never runs a turn — gets none of either.
pub fn tool_definitions_for(agent: AgentName, config: &Config, mcp: &McpManager) -> Vec<ToolDefinition> {
    if agent == AgentName::System {
        return Vec::new();
    }
    let allowed = allowed_tool_names(agent);
    let mut defs: Vec<ToolDefinition> = chainreview_tools::registry::build_tool_definitions(config)
        .into_iter()
        .filter(|d| allowed.contains(&d.name.as_str()))
        .collect();
    defs.extend(mcp_tool_definitions(mcp));
    defs
}

/// MCP tools, namespaced via [`chainreview_mcp::namespace_tool_name`] so they
/// can't collide with the core registry and so `turn::dispatch_one` can
/// route them back to the right server.
fn mcp_tool_definitions(mcp: &McpManager) -> Vec<ToolDefinition> {
    mcp.list_tools()
        .into_iter()
        .map(|(server_id, tool)| ToolDefinition {
            name: chainreview_mcp::namespace_tool_name(server_id, &tool.name),
            description: tool.description.clone(),
            parameters: tool.input_schema.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explainer_has_no_exec_command() {
        let defs = tool_definitions_for(AgentName::Explainer, &Config::default(), &McpManager::empty());
        assert!(!defs.iter().any(|d| d.name == "exec_command"));
    }

    #[test]
    fn security_tool_subset_includes_exec_command() {
        let defs = tool_definitions_for(AgentName::Security, &Config::default(), &McpManager::empty());
        assert!(defs.iter().any(|d| d.name == "exec_command"));
    }

    #[test]
    fn system_agent_has_no_tools() {
        let defs = tool_definitions_for(AgentName::System, &Config::default(), &McpManager::empty());
        assert!(defs.is_empty());
    }

    #[test]
    fn no_mcp_servers_means_no_mcp_tools() {
        let defs = tool_definitions_for(AgentName::Bugs, &Config::default(), &McpManager::empty());
        assert!(!defs.iter().any(|d| chainreview_mcp::is_namespaced(&d.name)));
    }
}

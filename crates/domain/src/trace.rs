//! Structured trace events emitted across ChainReview crates, independent
//! of the in-run [`crate::model::AuditEvent`] log. These are logging-layer
//! events for operators, not part of a run's persisted state.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    RunStarted { run_id: String, repo_root: String, agent_count: usize },
    RunFinished { run_id: String, status: String, finding_count: usize, duration_ms: u64 },
    AgentDispatched { run_id: String, agent: String },
    ToolInvoked { run_id: String, agent: String, tool: String, duration_ms: u64, ok: bool },
    PathEscapeBlocked { tool: String, requested: String },
    CommandRejected { command: String, reason: String },
    McpServerSpawned { server_id: String, command: String },
    McpServerUnavailable { server_id: String, reason: String },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "chainreview_event");
    }
}

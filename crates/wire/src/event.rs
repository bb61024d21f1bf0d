//! The side stream's event taxonomy. Every event on the wire
//! carries `__stream:true` plus a `type` discriminant; [`StreamEnvelope`]
//! adds the former so [`Event`] itself can stay a plain tagged enum.

use chainreview_domain::model::{AgentName, Finding};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Review,
    Chat,
    Validate,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "agent_started")]
    AgentStarted { run_id: String, agent: AgentName },
    #[serde(rename = "agent_completed")]
    AgentCompleted { run_id: String, agent: AgentName },
    #[serde(rename = "agent_error")]
    AgentError { run_id: String, agent: AgentName, message: String },

    #[serde(rename = "pipeline_step")]
    PipelineStep { run_id: String, step: String },

    #[serde(rename = "tool_call_start")]
    ToolCallStart { run_id: String, agent: AgentName, call_id: String, tool: String },
    #[serde(rename = "tool_call_end")]
    ToolCallEnd {
        run_id: String,
        agent: AgentName,
        call_id: String,
        tool: String,
        ok: bool,
        /// Truncated to at most 300 bytes.
        result_summary: String,
    },

    #[serde(rename = "text_delta")]
    TextDelta { run_id: String, agent: AgentName, channel: Channel, delta: String },
    #[serde(rename = "thinking_delta")]
    ThinkingDelta { run_id: String, agent: AgentName, channel: Channel, delta: String },
    #[serde(rename = "text_complete")]
    TextComplete { run_id: String, agent: AgentName, channel: Channel },
    #[serde(rename = "thinking_complete")]
    ThinkingComplete { run_id: String, agent: AgentName, channel: Channel },

    #[serde(rename = "finding")]
    FindingEvent { run_id: String, finding: Finding },

    #[serde(rename = "chatSpawnedReview")]
    ChatSpawnedReview { parent_run_id: String, child_run_id: String },

    /// Run-completion sentinel: exactly one per long-running request,
    /// emitted after all other side-stream events for that request and
    /// before the matching primary response.
    #[serde(rename = "sentinel")]
    Sentinel { request_id: i64, name: String },
}

/// Wraps an [`Event`] with the `__stream:true` wire marker.
#[derive(Debug, Clone, Serialize)]
pub struct StreamEnvelope {
    #[serde(rename = "__stream")]
    pub stream: bool,
    #[serde(flatten)]
    pub event: Event,
}

impl From<Event> for StreamEnvelope {
    fn from(event: Event) -> Self {
        Self { stream: true, event }
    }
}

/// Truncate a tool result summary to `max_bytes`, appending a byte-count
/// suffix when truncated.
pub fn truncate_summary(s: &str, max_bytes: usize) -> String {
    if s.len() <= max_bytes {
        return s.to_string();
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…(truncated {} bytes)", &s[..end], s.len() - end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_serializes_stream_marker_and_type() {
        let env: StreamEnvelope = Event::PipelineStep { run_id: "r1".into(), step: "scheduling".into() }.into();
        let v = serde_json::to_value(&env).unwrap();
        assert_eq!(v["__stream"], true);
        assert_eq!(v["type"], "pipeline_step");
        assert_eq!(v["run_id"], "r1");
    }

    #[test]
    fn tool_call_pair_shares_call_id() {
        let start: StreamEnvelope = Event::ToolCallStart {
            run_id: "r1".into(), agent: AgentName::Security, call_id: "c1".into(), tool: "repo.file".into(),
        }.into();
        let end: StreamEnvelope = Event::ToolCallEnd {
            run_id: "r1".into(), agent: AgentName::Security, call_id: "c1".into(), tool: "repo.file".into(),
            ok: true, result_summary: "ok".into(),
        }.into();
        let sv = serde_json::to_value(&start).unwrap();
        let ev = serde_json::to_value(&end).unwrap();
        assert_eq!(sv["call_id"], ev["call_id"]);
    }

    #[test]
    fn truncate_summary_under_limit_unchanged() {
        assert_eq!(truncate_summary("hello", 300), "hello");
    }

    #[test]
    fn truncate_summary_over_limit_adds_suffix() {
        let s = "a".repeat(400);
        let out = truncate_summary(&s, 300);
        assert!(out.starts_with(&"a".repeat(300)));
        assert!(out.ends_with("…(truncated 100 bytes)"));
    }
}

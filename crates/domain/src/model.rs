//! The run/finding/patch data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Repo,
    Diff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Complete,
    Error,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingCategory {
    Architecture,
    Security,
    Bugs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

/// The closed roster of agent identities that can appear as `Finding.agent`
/// or `AuditEvent.agent`. `System` tags orchestrator-originated events, not
/// an LLM-backed agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentName {
    Architecture,
    Security,
    Validator,
    Bugs,
    Explainer,
    System,
}

impl AgentName {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentName::Architecture => "architecture",
            AgentName::Security => "security",
            AgentName::Validator => "validator",
            AgentName::Bugs => "bugs",
            AgentName::Explainer => "explainer",
            AgentName::System => "system",
        }
    }
}

/// A pointer into the repo supporting a finding. `start_line <= end_line`
/// and the path must already have passed path-containment (enforced at the
/// tool boundary, not re-checked here).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub file_path: String,
    pub start_line: u32,
    pub end_line: u32,
    pub snippet: String,
}

impl Evidence {
    /// `1 <= start_line <= end_line` and the path is relative with no `..`
    /// component.
    pub fn is_valid(&self) -> bool {
        self.start_line >= 1
            && self.start_line <= self.end_line
            && !std::path::Path::new(&self.file_path).is_absolute()
            && !self.file_path.split('/').any(|c| c == "..")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub id: String,
    pub run_id: String,
    pub category: FindingCategory,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub agent: AgentName,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
    pub evidence: Vec<Evidence>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patch_id: Option<String>,
}

impl Finding {
    /// Key used for identical-finding dedup.
    pub fn dedup_key(&self) -> (String, u32, u32, String) {
        (
            self.evidence.first().map(|e| e.file_path.clone()).unwrap_or_default(),
            self.evidence.first().map(|e| e.start_line).unwrap_or(0),
            self.evidence.first().map(|e| e.end_line).unwrap_or(0),
            self.title.clone(),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patch {
    pub id: String,
    pub finding_id: String,
    pub file_path: String,
    pub original: String,
    pub replacement: String,
    pub unified_diff: String,
    pub validated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_message: Option<String>,
}

/// The closed set of audit event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    AgentStarted,
    AgentCompleted,
    EvidenceCollected,
    FindingEmitted,
    FindingExplained,
    PatchProposed,
    PatchValidated,
    PatchGenerated,
    HumanAccepted,
    HumanRejected,
    FalsePositiveMarked,
    IssueFixed,
    HandoffToAgent,
    ValidationCompleted,
    EvidenceRejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    pub run_id: String,
    #[serde(rename = "type")]
    pub event_type: AuditEventType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentName>,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
}

/// A run's validator verdict vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationVerdict {
    StillPresent,
    PartiallyFixed,
    Fixed,
    UnableToDetermine,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: crate::message::Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// The top-level run entity. The owning orchestrator is the single writer;
/// readers (request router) only ever see it through the run store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub run_id: String,
    pub repo_root: String,
    pub mode: RunMode,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub findings: Vec<Finding>,
    pub events: Vec<AuditEvent>,
    pub patches: Vec<Patch>,
    pub chat_transcript: Vec<ChatMessage>,
}

impl Run {
    pub fn new(run_id: String, repo_root: String, mode: RunMode) -> Self {
        Self {
            run_id,
            repo_root,
            mode,
            status: RunStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            error: None,
            findings: Vec::new(),
            events: Vec::new(),
            patches: Vec::new(),
            chat_transcript: Vec::new(),
        }
    }
}

/// A transient in-flight tool invocation, never persisted on `Run`.
#[derive(Debug, Clone)]
pub struct ToolCallRecord {
    pub call_id: String,
    pub tool: String,
    pub args: serde_json::Value,
    pub started_at: DateTime<Utc>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evidence_rejects_parent_traversal() {
        let e = Evidence { file_path: "../etc/passwd".into(), start_line: 1, end_line: 1, snippet: String::new() };
        assert!(!e.is_valid());
    }

    #[test]
    fn evidence_rejects_absolute_path() {
        let e = Evidence { file_path: "/etc/passwd".into(), start_line: 1, end_line: 1, snippet: String::new() };
        assert!(!e.is_valid());
    }

    #[test]
    fn evidence_rejects_inverted_range() {
        let e = Evidence { file_path: "src/lib.rs".into(), start_line: 5, end_line: 2, snippet: String::new() };
        assert!(!e.is_valid());
    }

    #[test]
    fn evidence_rejects_zero_start_line() {
        let e = Evidence { file_path: "src/lib.rs".into(), start_line: 0, end_line: 2, snippet: String::new() };
        assert!(!e.is_valid());
    }

    #[test]
    fn evidence_accepts_valid_range() {
        let e = Evidence { file_path: "src/lib.rs".into(), start_line: 2, end_line: 5, snippet: "fn f() {}".into() };
        assert!(e.is_valid());
    }
}

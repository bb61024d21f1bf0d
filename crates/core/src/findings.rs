//! Extracts structured findings, validator verdicts, and patch edits from an
//! agent's free-form final text. Agents are prompted to end their turn with
//! a single fenced block of a known shape; everything here is pure parsing,
//! no LLM calls.

use chainreview_domain::model::{AgentName, Evidence, Finding, FindingCategory, Severity, ValidationVerdict};
use serde::Deserialize;

#[derive(Debug, Default)]
pub struct ParsedFindings {
    pub findings: Vec<Finding>,
    /// Findings whose evidence failed validation; never delivered, only
    /// recorded as `EvidenceRejected` audit events.
    pub rejected: Vec<(RawFinding, String)>,
}

#[derive(Debug, Deserialize)]
pub struct RawFinding {
    pub(crate) category: FindingCategory,
    pub(crate) severity: Severity,
    pub(crate) title: String,
    pub(crate) description: String,
    pub(crate) confidence: f32,
    pub(crate) evidence: Vec<Evidence>,
}

/// Pull the last ` ```findings ` fenced block out of `text` and turn each
/// entry into a `Finding`, stamping in `run_id`/`agent`. Evidence failing
/// `Evidence::is_valid` is rejected rather than silently dropped or passed
/// through.
pub fn parse_findings(text: &str, run_id: &str, agent: AgentName) -> ParsedFindings {
    let mut out = ParsedFindings::default();
    let Some(block) = extract_fenced_block(text, "findings") else {
        return out;
    };
    let raw: Vec<RawFinding> = match serde_json::from_str(&block) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(%run_id, agent = agent.as_str(), error = %e, "failed to parse findings block");
            return out;
        }
    };

    for r in raw {
        if let Some(bad) = r.evidence.iter().find(|e| !e.is_valid()) {
            let msg = format!("invalid evidence: {}:{}-{}", bad.file_path, bad.start_line, bad.end_line);
            out.rejected.push((r, msg));
            continue;
        }
        out.findings.push(Finding {
            id: uuid::Uuid::new_v4().to_string(),
            run_id: run_id.to_string(),
            category: r.category,
            severity: r.severity,
            title: r.title,
            description: r.description,
            agent,
            confidence: r.confidence.clamp(0.0, 1.0),
            evidence: r.evidence,
            patch_id: None,
        });
    }
    out
}

/// Read the validator's trailing `VERDICT: <...>` line. Falls back to
/// `UnableToDetermine` if the line is missing or unrecognized rather than
/// erroring, since a malformed verdict line is the agent's fault, not a
/// caller error.
pub fn parse_verdict(text: &str) -> (ValidationVerdict, String) {
    for line in text.lines() {
        let Some(rest) = line.trim().strip_prefix("VERDICT:") else { continue };
        let verdict = match rest.trim().to_lowercase().as_str() {
            "still_present" => ValidationVerdict::StillPresent,
            "partially_fixed" => ValidationVerdict::PartiallyFixed,
            "fixed" => ValidationVerdict::Fixed,
            _ => ValidationVerdict::UnableToDetermine,
        };
        return (verdict, text.to_string());
    }
    (ValidationVerdict::UnableToDetermine, text.to_string())
}

#[derive(Debug, Deserialize)]
pub struct PatchEdit {
    pub original: String,
    pub replacement: String,
}

/// Read the patch generator's ` ```patch ` fenced JSON block.
pub fn parse_patch_edit(text: &str) -> Option<PatchEdit> {
    let block = extract_fenced_block(text, "patch")?;
    serde_json::from_str(&block).ok()
}

/// Find the last fenced code block tagged with `lang` (` ```lang ... ``` `)
/// and return its inner text. Using the last occurrence tolerates an agent
/// that narrates its reasoning in earlier blocks before the final answer.
fn extract_fenced_block(text: &str, lang: &str) -> Option<String> {
    let fence = format!("```{lang}");
    let start = text.rfind(&fence)? + fence.len();
    let rest = &text[start..];
    let end = rest.find("```")?;
    Some(rest[..end].trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_findings_block() {
        let text = r#"I reviewed the module.

```findings
[{"category":"security","severity":"high","title":"SQL injection","description":"raw string concat","confidence":0.9,"evidence":[{"file_path":"src/db.rs","start_line":10,"end_line":12,"snippet":"..."}]}]
```
"#;
        let parsed = parse_findings(text, "run-1", AgentName::Security);
        assert_eq!(parsed.findings.len(), 1);
        assert!(parsed.rejected.is_empty());
        assert_eq!(parsed.findings[0].run_id, "run-1");
    }

    #[test]
    fn rejects_finding_with_invalid_evidence() {
        let text = r#"```findings
[{"category":"bugs","severity":"low","title":"x","description":"y","confidence":0.5,"evidence":[{"file_path":"../escape.rs","start_line":1,"end_line":1,"snippet":"z"}]}]
```"#;
        let parsed = parse_findings(text, "run-1", AgentName::Bugs);
        assert!(parsed.findings.is_empty());
        assert_eq!(parsed.rejected.len(), 1);
    }

    #[test]
    fn missing_block_yields_empty_result() {
        let parsed = parse_findings("no findings here", "run-1", AgentName::Architecture);
        assert!(parsed.findings.is_empty());
        assert!(parsed.rejected.is_empty());
    }

    #[test]
    fn parses_verdict_line() {
        let (verdict, _) = parse_verdict("Looked at the code.\n\nVERDICT: fixed\n\nThe guard is in place now.");
        assert_eq!(verdict, ValidationVerdict::Fixed);
    }

    #[test]
    fn missing_verdict_line_is_undetermined() {
        let (verdict, _) = parse_verdict("I couldn't find the relevant file.");
        assert_eq!(verdict, ValidationVerdict::UnableToDetermine);
    }

    #[test]
    fn parses_patch_edit_block() {
        let text = "```patch\n{\"original\": \"old\", \"replacement\": \"new\"}\n```";
        let edit = parse_patch_edit(text).unwrap();
        assert_eq!(edit.original, "old");
        assert_eq!(edit.replacement, "new");
    }
}

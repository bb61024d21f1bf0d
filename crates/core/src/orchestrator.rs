//! Orchestrates a review run's agent fleet, finding dedup, chat turns, and
//! patch generation. The `Run` stored under `run_id` in the run store is the
//! single source of truth; everything here reads and mutates it through
//! [`crate::run_store::RunStore::with_mut`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use chainreview_domain::error::{Error, Result};
use chainreview_domain::message::{Message, Role, ToolDefinition};
use chainreview_domain::model::{
    AgentName, AuditEvent, AuditEventType, ChatMessage, Finding, Patch, Run, RunMode, RunStatus,
    ValidationVerdict,
};
use chainreview_domain::trace::TraceEvent;
use chainreview_wire::event::{Channel, Event};

use crate::cancel::CancelToken;
use crate::context::Context;
use crate::turn::ExtraToolDispatcher;

/// Agents included for a given run mode. `Architecture` is excluded from
/// diff mode: it reasons about module boundaries and dependency direction,
/// which need full-repo context a restricted diff view can't provide.
pub fn default_roster(mode: RunMode) -> Vec<AgentName> {
    match mode {
        RunMode::Repo => vec![AgentName::Architecture, AgentName::Security, AgentName::Bugs],
        RunMode::Diff => vec![AgentName::Security, AgentName::Bugs],
    }
}

/// Runs every agent in the roster concurrently. Returns once every agent
/// has finished or cancellation has been observed, whichever comes first.
///
/// There's no teacher analog for an async-notify cancellation wakeup (the
/// source `CancelToken` is a plain atomic with no `.cancelled()` future), so
/// responsiveness comes from racing the join against a short poll instead.
pub async fn run_review(ctx: Arc<Context>, run_id: String, mode: RunMode) -> Result<()> {
    let cancel = ctx.cancel_map.register(&run_id);
    let roster = default_roster(mode);
    let started_at = Utc::now();

    TraceEvent::RunStarted {
        run_id: run_id.clone(),
        repo_root: ctx.repo_root.display().to_string(),
        agent_count: roster.len(),
    }
    .emit();

    for agent in &roster {
        TraceEvent::AgentDispatched { run_id: run_id.clone(), agent: agent.as_str().to_string() }.emit();
        ctx.transport.send_event(Event::AgentStarted { run_id: run_id.clone(), agent: *agent }).await?;
    }

    let handles: Vec<_> = roster
        .iter()
        .map(|agent| {
            let ctx = ctx.clone();
            let run_id = run_id.clone();
            let cancel = cancel.clone();
            let agent = *agent;
            tokio::spawn(async move { run_review_agent(&ctx, &run_id, agent, &cancel).await })
        })
        .collect();

    let poll_cancelled = async {
        loop {
            if cancel.is_cancelled() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    };

    let joined = tokio::select! {
        results = futures_util::future::join_all(handles) => Some(results),
        _ = poll_cancelled => None,
    };

    ctx.cancel_map.remove(&run_id);

    match joined {
        Some(results) => {
            for (agent, result) in roster.into_iter().zip(results) {
                match result {
                    Ok(Ok(())) => {
                        ctx.transport.send_event(Event::AgentCompleted { run_id: run_id.clone(), agent }).await?;
                    }
                    Ok(Err(e)) => {
                        ctx.transport
                            .send_event(Event::AgentError { run_id: run_id.clone(), agent, message: e.human_message() })
                            .await?;
                    }
                    Err(join_err) => {
                        ctx.transport
                            .send_event(Event::AgentError { run_id: run_id.clone(), agent, message: join_err.to_string() })
                            .await?;
                    }
                }
            }
            ctx.run_store.with_mut(&run_id, |run| {
                run.status = RunStatus::Complete;
                run.completed_at = Some(Utc::now());
            })?;
        }
        None => {
            ctx.run_store.with_mut(&run_id, |run| {
                run.status = RunStatus::Cancelled;
                run.completed_at = Some(Utc::now());
            })?;
        }
    }

    let final_run = ctx.run_store.get(&run_id)?;
    TraceEvent::RunFinished {
        run_id: run_id.clone(),
        status: format!("{:?}", final_run.status),
        finding_count: final_run.findings.len(),
        duration_ms: (Utc::now() - started_at).num_milliseconds().max(0) as u64,
    }
    .emit();

    Ok(())
}

async fn run_review_agent(ctx: &Context, run_id: &str, agent: AgentName, cancel: &CancelToken) -> Result<()> {
    let system_prompt = crate::agents::system_prompt(agent);
    let tools = crate::agents::tool_definitions_for(agent, &ctx.config, &ctx.mcp);
    let run = ctx.run_store.get(run_id)?;
    let task = format!("Review the repository at {} (mode: {:?}).", run.repo_root, run.mode);
    let messages = vec![Message::user(task)];

    let final_text =
        crate::turn::run_agent(ctx, run_id, agent, Channel::Review, system_prompt, messages, tools, None, cancel)
            .await?;

    let parsed = crate::findings::parse_findings(&final_text, run_id, agent);
    for finding in parsed.findings {
        emit_finding(ctx, run_id, finding).await?;
    }
    for (raw, reason) in parsed.rejected {
        record_event(
            ctx,
            run_id,
            AuditEventType::EvidenceRejected,
            Some(agent),
            serde_json::json!({ "title": raw.title, "reason": reason }),
        )?;
    }
    Ok(())
}

/// Dedups against the run's existing findings by `(file, start, end, title)`:
/// a higher-confidence duplicate replaces the stored one; a tie or lower
/// confidence is dropped, so the first-written finding wins. Skips
/// entirely once the run has been cancelled, so a straggling agent can't
/// push findings into a run the caller already gave up on.
pub async fn emit_finding(ctx: &Context, run_id: &str, finding: Finding) -> Result<()> {
    let emitted = ctx.run_store.with_mut(run_id, |run| {
        if run.status == RunStatus::Cancelled {
            return None;
        }
        let key = finding.dedup_key();
        match run.findings.iter().position(|f| f.dedup_key() == key) {
            Some(idx) if finding.confidence > run.findings[idx].confidence => {
                run.findings[idx] = finding.clone();
                Some(finding.clone())
            }
            Some(_) => None,
            None => {
                run.findings.push(finding.clone());
                Some(finding.clone())
            }
        }
    })?;

    if let Some(finding) = emitted {
        ctx.transport.send_event(Event::FindingEvent { run_id: run_id.to_string(), finding: finding.clone() }).await?;
        record_event(
            ctx,
            run_id,
            AuditEventType::FindingEmitted,
            Some(finding.agent),
            serde_json::json!({ "finding_id": finding.id }),
        )?;
    }
    Ok(())
}

/// Re-checks a previously reported finding against the repository's current
/// state. Not part of a run's cancellation group: it's a short, bounded
/// single-agent call with its own deadline, not a long-running fleet.
pub async fn validate_finding(ctx: &Context, run_id: &str, finding_id: &str) -> Result<(ValidationVerdict, String)> {
    let run = ctx.run_store.get(run_id)?;
    let finding = run
        .findings
        .iter()
        .find(|f| f.id == finding_id)
        .cloned()
        .ok_or_else(|| Error::NoSuchFinding(finding_id.to_string()))?;

    let system_prompt = crate::agents::system_prompt(AgentName::Validator);
    let tools = crate::agents::tool_definitions_for(AgentName::Validator, &ctx.config, &ctx.mcp);
    let task = format!(
        "Finding: {}\n{}\nEvidence: {}:{}-{}\n{}",
        finding.title,
        finding.description,
        finding.evidence.first().map(|e| e.file_path.as_str()).unwrap_or(""),
        finding.evidence.first().map(|e| e.start_line).unwrap_or(0),
        finding.evidence.first().map(|e| e.end_line).unwrap_or(0),
        finding.evidence.first().map(|e| e.snippet.as_str()).unwrap_or(""),
    );
    let messages = vec![Message::user(task)];
    let cancel = CancelToken::new();

    let final_text = crate::turn::run_agent(
        ctx,
        run_id,
        AgentName::Validator,
        Channel::Validate,
        system_prompt,
        messages,
        tools,
        None,
        &cancel,
    )
    .await?;

    let (verdict, reasoning) = crate::findings::parse_verdict(&final_text);

    record_event(
        ctx,
        run_id,
        AuditEventType::ValidationCompleted,
        Some(AgentName::Validator),
        serde_json::json!({ "finding_id": finding_id, "verdict": verdict }),
    )?;

    Ok((verdict, reasoning))
}

/// Answers a chat question about a run, with the prior chat transcript as
/// context. The explainer agent can call `spawn_review` when the question
/// calls for a fresh pass over the repository rather than just an answer.
pub async fn chat_query(ctx: Arc<Context>, run_id: &str, message: &str) -> Result<String> {
    let run = ctx.run_store.get(run_id)?;
    let system_prompt = crate::agents::system_prompt(AgentName::Explainer);
    let tools = crate::agents::tool_definitions_for(AgentName::Explainer, &ctx.config, &ctx.mcp);

    let mut messages: Vec<Message> = run
        .chat_transcript
        .iter()
        .map(|m| match m.role {
            Role::Assistant => Message::assistant(m.content.clone()),
            _ => Message::user(m.content.clone()),
        })
        .collect();
    messages.push(Message::user(message.to_string()));

    let dispatcher = SpawnReviewDispatcher { ctx: ctx.clone(), parent_run_id: run_id.to_string(), mode: run.mode };
    let cancel = ctx.cancel_map.register(run_id);

    let final_text = crate::turn::run_agent(
        &ctx,
        run_id,
        AgentName::Explainer,
        Channel::Chat,
        system_prompt,
        messages,
        tools,
        Some(&dispatcher),
        &cancel,
    )
    .await?;

    ctx.cancel_map.remove(run_id);

    ctx.run_store.with_mut(run_id, |run| {
        run.chat_transcript.push(ChatMessage { role: Role::User, content: message.to_string(), timestamp: Utc::now() });
        run.chat_transcript.push(ChatMessage {
            role: Role::Assistant,
            content: final_text.clone(),
            timestamp: Utc::now(),
        });
    })?;

    Ok(final_text)
}

/// Lets the explainer agent's tool-use loop start a fresh review without
/// `turn.rs` depending on this module: `turn::run_agent` only knows about
/// the `ExtraToolDispatcher` trait, which this implements.
struct SpawnReviewDispatcher {
    ctx: Arc<Context>,
    parent_run_id: String,
    mode: RunMode,
}

#[async_trait::async_trait]
impl ExtraToolDispatcher for SpawnReviewDispatcher {
    fn definitions(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition {
            name: "spawn_review".into(),
            description: "Start a fresh review run over the repository and return its run id.".into(),
            parameters: serde_json::json!({ "type": "object", "properties": {}, "required": [] }),
        }]
    }

    async fn dispatch(&self, tool_name: &str, _arguments: &Value) -> Option<(String, bool)> {
        if tool_name != "spawn_review" {
            return None;
        }

        let child_run_id = Uuid::new_v4().to_string();
        let parent = self.ctx.run_store.get(&self.parent_run_id).ok()?;
        self.ctx.run_store.insert(Run::new(child_run_id.clone(), parent.repo_root.clone(), self.mode));
        self.ctx.cancel_map.add_to_group(&self.parent_run_id, &child_run_id);

        if let Err(e) = self
            .ctx
            .transport
            .send_event(Event::ChatSpawnedReview {
                parent_run_id: self.parent_run_id.clone(),
                child_run_id: child_run_id.clone(),
            })
            .await
        {
            return Some((e.human_message(), true));
        }

        let ctx = self.ctx.clone();
        let spawned_run_id = child_run_id.clone();
        let mode = self.mode;
        tokio::spawn(async move {
            if let Err(e) = run_review(ctx, spawned_run_id.clone(), mode).await {
                tracing::warn!(run_id = %spawned_run_id, error = %e, "spawned review failed");
            }
        });

        Some((serde_json::json!({ "run_id": child_run_id }).to_string(), false))
    }
}

pub fn cancel_run(ctx: &Context, run_id: &str) -> bool {
    ctx.cancel_map.cancel(run_id)
}

/// Generates a patch for a finding: runs a one-shot patch-generator turn,
/// parses its edit, then hands it to `patch_tools::propose` for the
/// single-occurrence anchor check and unified diff. Tagged with the
/// reporting agent, since patch generation has no dedicated roster entry.
pub async fn generate_patch(ctx: &Context, run_id: &str, finding_id: &str) -> Result<Patch> {
    let run = ctx.run_store.get(run_id)?;
    let finding = run
        .findings
        .iter()
        .find(|f| f.id == finding_id)
        .cloned()
        .ok_or_else(|| Error::NoSuchFinding(finding_id.to_string()))?;
    let evidence = finding
        .evidence
        .first()
        .ok_or_else(|| Error::ToolArgs("finding has no evidence to patch".into()))?;

    let system_prompt = crate::agents::patch_generator_prompt();
    let task = format!(
        "Finding: {}\n{}\nFile: {}\nSnippet:\n{}",
        finding.title, finding.description, evidence.file_path, evidence.snippet
    );
    let messages = vec![Message::user(task)];
    let cancel = CancelToken::new();

    let final_text = crate::turn::run_agent(
        ctx,
        run_id,
        finding.agent,
        Channel::Review,
        system_prompt,
        messages,
        Vec::new(),
        None,
        &cancel,
    )
    .await?;

    let edit = crate::findings::parse_patch_edit(&final_text)
        .ok_or_else(|| Error::LlmProvider("patch generator did not return a patch block".into()))?;

    let patch =
        chainreview_tools::patch_tools::propose(&ctx.repo_root, finding_id, &evidence.file_path, &edit.original, &edit.replacement)
            .await?;

    ctx.run_store.with_mut(run_id, |run| {
        run.patches.push(patch.clone());
        if let Some(f) = run.findings.iter_mut().find(|f| f.id == finding_id) {
            f.patch_id = Some(patch.id.clone());
        }
    })?;

    record_event(
        ctx,
        run_id,
        AuditEventType::PatchGenerated,
        Some(finding.agent),
        serde_json::json!({ "patch_id": patch.id, "finding_id": finding_id }),
    )?;

    Ok(patch)
}

pub fn record_event(
    ctx: &Context,
    run_id: &str,
    event_type: AuditEventType,
    agent: Option<AgentName>,
    data: Value,
) -> Result<()> {
    ctx.run_store.with_mut(run_id, |run| {
        run.events.push(AuditEvent {
            id: Uuid::new_v4().to_string(),
            run_id: run_id.to_string(),
            event_type,
            agent,
            timestamp: Utc::now(),
            data,
        });
    })
}

//! Dispatches one primary-stream request to its handler, then closes out
//! the side stream (sentinel, for long-running methods) and the primary
//! response, in that order — the wire ordering guarantee every client
//! depends on.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

use chainreview_domain::error::{Error, Result};
use chainreview_domain::message::Role;
use chainreview_domain::model::{AgentName, AuditEventType, ChatMessage, Run, RunMode};
use chainreview_wire::envelope::{is_long_running, Request, Response};
use chainreview_wire::event::Event;

use crate::context::Context;
use crate::orchestrator;

/// Handle one request end to end: run its handler under the method's
/// deadline, then emit the sentinel (if long-running) and the response.
/// Spawned as its own task by the read loop so one slow request never
/// blocks the next one from being read off stdin.
pub async fn dispatch(ctx: Arc<Context>, request: Request) {
    let id = request.id;
    let method = request.method.clone();
    let deadline = ctx.transport.deadline_for(&method);

    let outcome = tokio::time::timeout(deadline, route(ctx.clone(), &request)).await;
    let response = match outcome {
        Ok(Ok(value)) => Response::ok(id, value),
        Ok(Err(e)) => Response::err(id, &e),
        Err(_) => Response::err(id, &Error::Timeout(method.clone())),
    };

    if let Some(name) = sentinel_name(&method) {
        if let Err(e) = ctx.transport.send_event(Event::Sentinel { request_id: id, name: name.to_string() }).await {
            tracing::warn!(%id, error = %e, "failed to send sentinel");
        }
    }

    if let Err(e) = ctx.transport.send_response(response).await {
        tracing::error!(%id, error = %e, "failed to write primary response");
    }
}

fn sentinel_name(method: &str) -> Option<&'static str> {
    match method {
        "review.run" => Some("reviewRunComplete"),
        "chat.query" => Some("chatStreamComplete"),
        "review.validate_finding" => Some("validateFindingComplete"),
        "patch.generate" => Some("patchGenerateComplete"),
        _ => None,
    }
}

async fn route(ctx: Arc<Context>, request: &Request) -> Result<Value> {
    debug_assert!(is_long_running(&request.method) || sentinel_name(&request.method).is_none());

    match request.method.as_str() {
        "review.run" => {
            let mode = match param_opt_str(&request.params, "mode") {
                Some("diff") => RunMode::Diff,
                _ => RunMode::Repo,
            };
            let repo_root = param_opt_str(&request.params, "repo_root")
                .map(str::to_string)
                .unwrap_or_else(|| ctx.repo_root.display().to_string());

            let run_id = Uuid::new_v4().to_string();
            ctx.run_store.insert(Run::new(run_id.clone(), repo_root, mode));
            orchestrator::run_review(ctx.clone(), run_id.clone(), mode).await?;
            Ok(serde_json::to_value(ctx.run_store.get(&run_id)?)?)
        }

        "review.cancel" => {
            let run_id = param_str(&request.params, "run_id")?;
            let cancelled = orchestrator::cancel_run(&ctx, run_id);
            Ok(serde_json::json!({ "cancelled": cancelled }))
        }

        "review.get_findings" => {
            let run_id = param_str(&request.params, "run_id")?;
            let run = ctx.run_store.get(run_id)?;
            Ok(serde_json::json!({ "findings": run.findings }))
        }

        "review.get_events" => {
            let run_id = param_str(&request.params, "run_id")?;
            let run = ctx.run_store.get(run_id)?;
            Ok(serde_json::json!({ "events": run.events }))
        }

        "review.list_runs" => {
            let limit = param_usize(&request.params, "limit", 50);
            Ok(serde_json::to_value(ctx.run_store.list(limit))?)
        }

        "review.delete_run" => {
            let run_id = param_str(&request.params, "run_id")?;
            ctx.run_store.delete(run_id)?;
            Ok(serde_json::json!({ "deleted": true }))
        }

        "review.record_event" => {
            let run_id = param_str(&request.params, "run_id")?.to_string();
            let event_type: AuditEventType = serde_json::from_value(request.params.get("type").cloned().unwrap_or(Value::Null))
                .map_err(|_| Error::ToolArgs("missing or invalid 'type'".into()))?;
            let agent: Option<AgentName> =
                request.params.get("agent").and_then(|v| serde_json::from_value(v.clone()).ok());
            let data = request.params.get("data").cloned().unwrap_or(Value::Null);
            orchestrator::record_event(&ctx, &run_id, event_type, agent, data)?;
            Ok(serde_json::json!({ "recorded": true }))
        }

        "review.save_chat_messages" => {
            #[derive(Deserialize)]
            struct IncomingMessage {
                role: Role,
                content: String,
            }
            let run_id = param_str(&request.params, "run_id")?.to_string();
            let raw = request.params.get("messages").cloned().unwrap_or_else(|| Value::Array(vec![]));
            let incoming: Vec<IncomingMessage> = serde_json::from_value(raw)?;
            ctx.run_store.with_mut(&run_id, |run| {
                for m in incoming {
                    run.chat_transcript.push(ChatMessage { role: m.role, content: m.content, timestamp: Utc::now() });
                }
            })?;
            Ok(serde_json::json!({ "saved": true }))
        }

        "review.get_chat_messages" => {
            let run_id = param_str(&request.params, "run_id")?;
            let run = ctx.run_store.get(run_id)?;
            Ok(serde_json::json!({ "messages": run.chat_transcript }))
        }

        "review.validate_finding" => {
            let run_id = param_str(&request.params, "run_id")?;
            let finding_id = param_str(&request.params, "finding_id")?;
            let (verdict, reasoning) = orchestrator::validate_finding(&ctx, run_id, finding_id).await?;
            Ok(serde_json::json!({ "verdict": verdict, "reasoning": reasoning }))
        }

        "chat.query" => {
            let run_id = param_str(&request.params, "run_id")?.to_string();
            let message = param_str(&request.params, "message")?.to_string();
            let answer = orchestrator::chat_query(ctx.clone(), &run_id, &message).await?;
            Ok(serde_json::json!({ "answer": answer }))
        }

        "patch.propose" => {
            let finding_id = param_str(&request.params, "finding_id")?;
            let file = param_str(&request.params, "file")?;
            let original = param_str(&request.params, "original")?;
            let replacement = param_str(&request.params, "replacement")?;
            let patch = chainreview_tools::patch_tools::propose(&ctx.repo_root, finding_id, file, original, replacement).await?;
            if let Some(run_id) = param_opt_str(&request.params, "run_id") {
                let _ = orchestrator::record_event(
                    &ctx,
                    run_id,
                    AuditEventType::PatchProposed,
                    None,
                    serde_json::json!({ "patch_id": patch.id, "finding_id": finding_id }),
                );
            }
            Ok(serde_json::to_value(patch)?)
        }

        "patch.validate" => {
            let patch = parse_patch_param(&request.params)?;
            let (validated, validation_message) = chainreview_tools::patch_tools::validate(&ctx.repo_root, &patch).await?;
            if let Some(run_id) = param_opt_str(&request.params, "run_id") {
                let _ = orchestrator::record_event(
                    &ctx,
                    run_id,
                    AuditEventType::PatchValidated,
                    None,
                    serde_json::json!({ "patch_id": patch.id, "validated": validated }),
                );
            }
            Ok(serde_json::json!({ "validated": validated, "validation_message": validation_message }))
        }

        "patch.apply" => {
            let patch = parse_patch_param(&request.params)?;
            chainreview_tools::patch_tools::apply(&ctx.repo_root, &patch).await?;
            if let Some(run_id) = param_opt_str(&request.params, "run_id") {
                let _ = orchestrator::record_event(
                    &ctx,
                    run_id,
                    AuditEventType::IssueFixed,
                    None,
                    serde_json::json!({ "patch_id": patch.id }),
                );
            }
            Ok(serde_json::json!({ "applied": true }))
        }

        "patch.generate" => {
            let run_id = param_str(&request.params, "run_id")?;
            let finding_id = param_str(&request.params, "finding_id")?;
            let patch = orchestrator::generate_patch(&ctx, run_id, finding_id).await?;
            Ok(serde_json::to_value(patch)?)
        }

        "repo.open" => Ok(serde_json::to_value(chainreview_tools::repo_tools::repo_open(&ctx.repo_root).await?)?),

        "repo.tree" => {
            let pattern = param_opt_str(&request.params, "pattern");
            Ok(serde_json::to_value(chainreview_tools::repo_tools::repo_tree(&ctx.repo_root, pattern)?)?)
        }

        "repo.file" => {
            let path = param_str(&request.params, "path")?;
            let start_line = param_u32(&request.params, "start_line");
            let end_line = param_u32(&request.params, "end_line");
            Ok(serde_json::to_value(chainreview_tools::repo_tools::repo_file(&ctx.repo_root, path, start_line, end_line).await?)?)
        }

        other => Err(Error::ToolArgs(format!("unknown method '{other}'"))),
    }
}

fn parse_patch_param(params: &Value) -> Result<chainreview_domain::model::Patch> {
    let raw = params.get("patch").cloned().unwrap_or(Value::Null);
    serde_json::from_value(raw).map_err(|e| Error::ToolArgs(format!("invalid 'patch' parameter: {e}")))
}

fn param_str<'a>(params: &'a Value, key: &str) -> Result<&'a str> {
    params.get(key).and_then(|v| v.as_str()).ok_or_else(|| Error::ToolArgs(format!("missing '{key}' parameter")))
}

fn param_opt_str<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str())
}

fn param_u32(params: &Value, key: &str) -> Option<u32> {
    params.get(key).and_then(|v| v.as_u64()).map(|n| n as u32)
}

fn param_usize(params: &Value, key: &str, default: usize) -> usize {
    params.get(key).and_then(|v| v.as_u64()).map(|n| n as usize).unwrap_or(default)
}

//! Drives one agent through a tool-use loop against its `LlmProvider`,
//! emitting side-stream events as it goes, until the model stops without
//! requesting another tool call or the loop cap / cancellation cuts it off.

use std::collections::HashMap;

use futures_util::StreamExt;
use serde_json::Value;

use chainreview_domain::error::{Error, Result};
use chainreview_domain::message::{ContentPart, Message, MessageContent, Role, ToolDefinition};
use chainreview_domain::model::AgentName;
use chainreview_domain::stream::{LlmFrame, StopReason};
use chainreview_domain::trace::TraceEvent;
use chainreview_llm::ChatRequest;
use chainreview_wire::event::{Channel, Event};

use crate::cancel::CancelToken;
use crate::context::Context;

const MAX_TOOL_LOOPS: usize = 25;

/// A tool source beyond the standard registry, dispatched into a running
/// turn without `turn.rs` depending on `orchestrator.rs` (which defines the
/// one extra tool, `spawn_review`, currently in use).
#[async_trait::async_trait]
pub trait ExtraToolDispatcher: Send + Sync {
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Returns `None` when `tool_name` isn't one of this dispatcher's tools,
    /// so the caller can fall through to the standard registry dispatch.
    async fn dispatch(&self, tool_name: &str, arguments: &Value) -> Option<(String, bool)>;
}

#[derive(Debug, Clone)]
struct PendingToolCall {
    call_id: String,
    tool: String,
    args_buf: String,
}

/// Runs `agent` through the tool-use loop until it stops without another
/// tool call. Returns the model's final text. `channel` determines which
/// side-stream channel text/thinking deltas are tagged with.
#[allow(clippy::too_many_arguments)]
pub async fn run_agent(
    ctx: &Context,
    run_id: &str,
    agent: AgentName,
    channel: Channel,
    system_prompt: String,
    mut messages: Vec<Message>,
    tools: Vec<ToolDefinition>,
    extra: Option<&(dyn ExtraToolDispatcher)>,
    cancel: &CancelToken,
) -> Result<String> {
    let mut all_tools = tools;
    if let Some(extra) = extra {
        all_tools.extend(extra.definitions());
    }

    let mut final_text = String::new();

    for _ in 0..MAX_TOOL_LOOPS {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let req = ChatRequest {
            system_prompt: system_prompt.clone(),
            messages: messages.clone(),
            tools: all_tools.clone(),
            temperature: None,
            max_tokens: None,
            model: None,
        };

        let mut stream = ctx.llm.chat_stream(req).await?;

        let mut turn_text = String::new();
        let mut pending: HashMap<String, PendingToolCall> = HashMap::new();
        let mut pending_order: Vec<String> = Vec::new();
        let mut stop_reason = StopReason::EndTurn;
        let mut text_open = false;
        let mut thinking_open = false;

        while let Some(frame) = stream.next().await {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            match frame? {
                LlmFrame::TextDelta { delta } => {
                    text_open = true;
                    turn_text.push_str(&delta);
                    ctx.transport
                        .send_event(Event::TextDelta { run_id: run_id.to_string(), agent, channel, delta })
                        .await?;
                }
                LlmFrame::ThinkingDelta { delta } => {
                    thinking_open = true;
                    ctx.transport
                        .send_event(Event::ThinkingDelta { run_id: run_id.to_string(), agent, channel, delta })
                        .await?;
                }
                LlmFrame::ToolUse { call_id, tool, args } => {
                    pending_order.push(call_id.clone());
                    pending.insert(
                        call_id.clone(),
                        PendingToolCall { call_id, tool, args_buf: args.to_string() },
                    );
                }
                LlmFrame::ToolResultAck { .. } => {}
                LlmFrame::TurnComplete { .. } => {}
                LlmFrame::Stop { reason } => {
                    stop_reason = reason;
                    break;
                }
                LlmFrame::Error { message } => return Err(Error::LlmProvider(message)),
            }
        }

        if text_open {
            ctx.transport.send_event(Event::TextComplete { run_id: run_id.to_string(), agent, channel }).await?;
        }
        if thinking_open {
            ctx.transport.send_event(Event::ThinkingComplete { run_id: run_id.to_string(), agent, channel }).await?;
        }

        final_text = turn_text.clone();

        match stop_reason {
            StopReason::Cancelled => return Err(Error::Cancelled),
            StopReason::Error => return Err(Error::LlmProvider("model reported an error stop".into())),
            StopReason::EndTurn => return Ok(final_text),
            StopReason::ToolUse => {
                if pending_order.is_empty() {
                    return Ok(final_text);
                }

                let assistant_parts: Vec<ContentPart> = pending_order
                    .iter()
                    .map(|id| {
                        let call = &pending[id];
                        let input: Value = serde_json::from_str(&call.args_buf).unwrap_or(Value::Null);
                        ContentPart::ToolUse { id: call.call_id.clone(), name: call.tool.clone(), input }
                    })
                    .collect();
                messages.push(Message { role: Role::Assistant, content: MessageContent::Parts(assistant_parts) });

                // Dispatched one at a time, not concurrently: the side stream
                // must not interleave tool_call_start/end pairs within an
                // agent, and a model can emit more than one tool_use block
                // in a single turn.
                let mut results = Vec::with_capacity(pending_order.len());
                for id in &pending_order {
                    let call = pending[id].clone();
                    let args: Value = serde_json::from_str(&call.args_buf).unwrap_or(Value::Null);
                    ctx.transport
                        .send_event(Event::ToolCallStart {
                            run_id: run_id.to_string(),
                            agent,
                            call_id: call.call_id.clone(),
                            tool: call.tool.clone(),
                        })
                        .await
                        .ok();

                    let started = std::time::Instant::now();
                    let (result, is_error) = dispatch_one(ctx, extra, &call.tool, &args).await;
                    TraceEvent::ToolInvoked {
                        run_id: run_id.to_string(),
                        agent: agent.as_str().to_string(),
                        tool: call.tool.clone(),
                        duration_ms: started.elapsed().as_millis() as u64,
                        ok: !is_error,
                    }
                    .emit();

                    let summary =
                        chainreview_wire::event::truncate_summary(&result, ctx.config.limits.tool_result_summary_bytes);
                    ctx.transport
                        .send_event(Event::ToolCallEnd {
                            run_id: run_id.to_string(),
                            agent,
                            call_id: call.call_id.clone(),
                            tool: call.tool.clone(),
                            ok: !is_error,
                            result_summary: summary,
                        })
                        .await
                        .ok();

                    results.push((call.call_id, result, is_error));
                }

                for (call_id, result, is_error) in results {
                    messages.push(Message::tool_result(call_id, result, is_error));
                }
            }
        }
    }

    Ok(final_text)
}

async fn dispatch_one(
    ctx: &Context,
    extra: Option<&(dyn ExtraToolDispatcher)>,
    tool: &str,
    args: &Value,
) -> (String, bool) {
    if let Some(extra) = extra {
        if let Some(result) = extra.dispatch(tool, args).await {
            return result;
        }
    }
    if chainreview_mcp::is_namespaced(tool) {
        return dispatch_mcp(ctx, tool, args).await;
    }
    chainreview_tools::registry::dispatch_tool(&ctx.repo_root, &ctx.config, tool, args).await
}

/// Routes a namespaced MCP call (see `agents::tool_definitions_for`) to the
/// owning server.
async fn dispatch_mcp(ctx: &Context, tool: &str, args: &Value) -> (String, bool) {
    let Some((server_id, tool_name)) = chainreview_mcp::split_namespaced_tool_name(tool) else {
        return (format!("malformed MCP tool name '{tool}'"), true);
    };
    match ctx.mcp.call_tool(server_id, tool_name, args.clone()).await {
        Ok(result) => {
            let text = result.content.iter().map(|c| c.text.as_str()).collect::<Vec<_>>().join("\n");
            (text, result.is_error)
        }
        Err(e) => (e.to_string(), true),
    }
}

//! Anthropic-native adapter: the Anthropic Messages API with streaming and
//! tool use, including the Anthropic-specific message structure where
//! system prompts go in a separate top-level `system` field.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;

use chainreview_domain::error::{Error, Result};
use chainreview_domain::message::{ContentPart, Message, MessageContent, Role, ToolDefinition};
use chainreview_domain::stream::{BoxStream, LlmFrame, StopReason, Usage};

use crate::traits::{ChatRequest, LlmProvider};
use crate::util::from_reqwest;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 8192;

pub struct AnthropicProvider {
    base_url: String,
    api_key: String,
    default_model: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(api_key: String, default_model: String, base_url: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            base_url: base_url.unwrap_or_else(|| "https://api.anthropic.com".to_string()).trim_end_matches('/').to_string(),
            api_key,
            default_model,
            client,
        })
    }

    fn authed_post(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
    }

    fn build_messages_body(&self, req: &ChatRequest) -> Value {
        let model = req.model.clone().unwrap_or_else(|| self.default_model.clone());
        let api_messages: Vec<Value> = req.messages.iter().map(message_to_anthropic).collect();

        let mut body = serde_json::json!({
            "model": model,
            "messages": api_messages,
            "stream": true,
            "max_tokens": req.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        });

        if !req.system_prompt.is_empty() {
            body["system"] = Value::String(req.system_prompt.clone());
        }
        if !req.tools.is_empty() {
            body["tools"] = Value::Array(req.tools.iter().map(tool_to_anthropic).collect());
        }
        if let Some(temp) = req.temperature {
            body["temperature"] = serde_json::json!(temp);
        }

        body
    }
}

fn message_to_anthropic(msg: &Message) -> Value {
    match msg.role {
        Role::System => serde_json::json!({ "role": "user", "content": msg.content.extract_all_text() }),
        Role::User => user_msg_to_anthropic(msg),
        Role::Assistant => assistant_msg_to_anthropic(msg),
        Role::Tool => tool_result_to_anthropic(msg),
    }
}

fn user_msg_to_anthropic(msg: &Message) -> Value {
    match &msg.content {
        MessageContent::Text(t) => serde_json::json!({ "role": "user", "content": t }),
        MessageContent::Parts(parts) => {
            let content: Vec<Value> = parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(serde_json::json!({ "type": "text", "text": text })),
                    _ => None,
                })
                .collect();
            serde_json::json!({ "role": "user", "content": content })
        }
    }
}

fn assistant_msg_to_anthropic(msg: &Message) -> Value {
    match &msg.content {
        MessageContent::Text(t) => serde_json::json!({
            "role": "assistant",
            "content": [{ "type": "text", "text": t }],
        }),
        MessageContent::Parts(parts) => {
            let content: Vec<Value> = parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(serde_json::json!({ "type": "text", "text": text })),
                    ContentPart::ToolUse { id, name, input } => Some(serde_json::json!({
                        "type": "tool_use", "id": id, "name": name, "input": input,
                    })),
                    _ => None,
                })
                .collect();
            serde_json::json!({ "role": "assistant", "content": content })
        }
    }
}

fn tool_result_to_anthropic(msg: &Message) -> Value {
    let content: Vec<Value> = match &msg.content {
        MessageContent::Parts(parts) => parts
            .iter()
            .filter_map(|p| match p {
                ContentPart::ToolResult { tool_use_id, content, is_error } => Some(serde_json::json!({
                    "type": "tool_result",
                    "tool_use_id": tool_use_id,
                    "content": content,
                    "is_error": is_error,
                })),
                _ => None,
            })
            .collect(),
        MessageContent::Text(t) => vec![serde_json::json!({
            "type": "tool_result", "tool_use_id": "", "content": t,
        })],
    };
    serde_json::json!({ "role": "user", "content": content })
}

fn tool_to_anthropic(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "name": tool.name,
        "description": tool.description,
        "input_schema": tool.parameters,
    })
}

/// Assembly state for a streamed response: tool-call args arrive as a
/// sequence of partial JSON deltas keyed by content-block index.
struct StreamState {
    active_tool_calls: HashMap<u64, (String, String, String)>,
    usage: Option<Usage>,
}

impl StreamState {
    fn new() -> Self {
        Self { active_tool_calls: HashMap::new(), usage: None }
    }
}

fn parse_anthropic_usage(v: &Value) -> Option<Usage> {
    let input = v.get("input_tokens")?.as_u64()? as u32;
    let output = v.get("output_tokens")?.as_u64().unwrap_or(0) as u32;
    Some(Usage { prompt_tokens: input, completion_tokens: output, total_tokens: input + output })
}

fn parse_anthropic_sse(data: &str, state: &mut StreamState) -> Vec<Result<LlmFrame>> {
    let mut frames = Vec::new();

    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => {
            frames.push(Err(Error::Json(e)));
            return frames;
        }
    };

    let event_type = v.get("type").and_then(|v| v.as_str()).unwrap_or("");

    match event_type {
        "message_start" => {
            if let Some(msg) = v.get("message") {
                state.usage = msg.get("usage").and_then(parse_anthropic_usage);
            }
        }

        "content_block_start" => {
            let idx = v.get("index").and_then(|v| v.as_u64()).unwrap_or(0);
            if let Some(block) = v.get("content_block") {
                if block.get("type").and_then(|v| v.as_str()) == Some("tool_use") {
                    let call_id = block.get("id").and_then(|v| v.as_str()).unwrap_or("").to_string();
                    let name = block.get("name").and_then(|v| v.as_str()).unwrap_or("").to_string();
                    state.active_tool_calls.insert(idx, (call_id, name, String::new()));
                }
            }
        }

        "content_block_delta" => {
            let idx = v.get("index").and_then(|v| v.as_u64()).unwrap_or(0);
            if let Some(delta) = v.get("delta") {
                match delta.get("type").and_then(|v| v.as_str()).unwrap_or("") {
                    "text_delta" => {
                        if let Some(text) = delta.get("text").and_then(|v| v.as_str()) {
                            if !text.is_empty() {
                                frames.push(Ok(LlmFrame::TextDelta { delta: text.to_string() }));
                            }
                        }
                    }
                    "thinking_delta" => {
                        if let Some(text) = delta.get("thinking").and_then(|v| v.as_str()) {
                            if !text.is_empty() {
                                frames.push(Ok(LlmFrame::ThinkingDelta { delta: text.to_string() }));
                            }
                        }
                    }
                    "input_json_delta" => {
                        if let Some(partial) = delta.get("partial_json").and_then(|v| v.as_str()) {
                            if let Some(tc) = state.active_tool_calls.get_mut(&idx) {
                                tc.2.push_str(partial);
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        "content_block_stop" => {
            let idx = v.get("index").and_then(|v| v.as_u64()).unwrap_or(0);
            if let Some((call_id, tool_name, args_str)) = state.active_tool_calls.remove(&idx) {
                if !call_id.is_empty() {
                    let args: Value = serde_json::from_str(&args_str).unwrap_or(Value::Object(Default::default()));
                    frames.push(Ok(LlmFrame::ToolUse { call_id, tool: tool_name, args }));
                }
            }
        }

        "message_delta" => {
            if let Some(output) = v.get("usage").and_then(|u| u.get("output_tokens")).and_then(|v| v.as_u64()) {
                if let Some(ref mut u) = state.usage {
                    u.completion_tokens = output as u32;
                    u.total_tokens = u.prompt_tokens + u.completion_tokens;
                }
            }
            if let Some(stop_reason) = v.get("delta").and_then(|d| d.get("stop_reason")).and_then(|v| v.as_str()) {
                frames.push(Ok(LlmFrame::TurnComplete { usage: state.usage.clone() }));
                frames.push(Ok(LlmFrame::Stop { reason: map_stop_reason(stop_reason) }));
            }
        }

        "error" => {
            let msg = v.get("error").and_then(|e| e.get("message")).and_then(|v| v.as_str()).unwrap_or("unknown error");
            frames.push(Ok(LlmFrame::Error { message: msg.to_string() }));
        }

        _ => {}
    }

    frames
}

fn map_stop_reason(reason: &str) -> StopReason {
    match reason {
        "tool_use" => StopReason::ToolUse,
        "end_turn" | "max_tokens" | "stop_sequence" => StopReason::EndTurn,
        _ => StopReason::EndTurn,
    }
}

#[async_trait::async_trait]
impl LlmProvider for AnthropicProvider {
    async fn chat_stream(&self, req: ChatRequest) -> Result<BoxStream<'static, Result<LlmFrame>>> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_messages_body(&req);

        tracing::debug!(url = %url, "anthropic stream request");

        let resp = self.authed_post(&url).json(&body).send().await.map_err(from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.map_err(from_reqwest)?;
            return Err(Error::LlmProvider(format!("HTTP {} - {text}", status.as_u16())));
        }

        let mut state = StreamState::new();
        Ok(crate::sse::sse_response_stream(resp, move |data| parse_anthropic_sse(data, &mut state)))
    }

    fn provider_id(&self) -> &str {
        "anthropic"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }
}

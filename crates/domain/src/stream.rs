//! The LLM client abstraction's streaming frame taxonomy.
//!
//! A provider adapter turns its wire format into this provider-agnostic
//! sequence; the agent runtime's turn loop consumes nothing else.

use serde::{Deserialize, Serialize};
use std::pin::Pin;

pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum LlmFrame {
    #[serde(rename = "text_delta")]
    TextDelta { delta: String },

    #[serde(rename = "thinking_delta")]
    ThinkingDelta { delta: String },

    #[serde(rename = "tool_use")]
    ToolUse {
        call_id: String,
        tool: String,
        args: serde_json::Value,
    },

    #[serde(rename = "tool_result_ack")]
    ToolResultAck { call_id: String },

    #[serde(rename = "turn_complete")]
    TurnComplete { usage: Option<Usage> },

    #[serde(rename = "stop")]
    Stop { reason: StopReason },

    #[serde(rename = "error")]
    Error { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    ToolUse,
    Cancelled,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

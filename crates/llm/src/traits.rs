//! The provider-agnostic streaming chat interface every LLM adapter
//! implements: system prompt, message history, and tool schemas in; a
//! stream of [`LlmFrame`]s out.

use chainreview_domain::error::Result;
use chainreview_domain::message::{Message, ToolDefinition};
use chainreview_domain::stream::BoxStream;

#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    pub system_prompt: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub model: Option<String>,
}

/// An LLM adapter that turns a [`ChatRequest`] into a frame stream. There is
/// no non-streaming `chat` method: every caller in this system drives a
/// turn loop over frames, even to get a single final answer.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    async fn chat_stream(&self, req: ChatRequest) -> Result<BoxStream<'static, Result<chainreview_domain::stream::LlmFrame>>>;

    fn provider_id(&self) -> &str;

    fn default_model(&self) -> &str;
}

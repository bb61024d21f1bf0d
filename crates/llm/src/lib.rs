pub mod anthropic;
pub mod sse;
pub mod traits;
pub mod util;

use chainreview_domain::config::LlmConfig;
use chainreview_domain::error::{Error, Result};

pub use traits::{ChatRequest, LlmProvider};

/// Build the configured provider. Only `anthropic` is implemented; an
/// unrecognized `provider` value fails at startup rather than silently
/// defaulting, since a misconfigured run would otherwise fail much later
/// on the first LLM call.
pub fn build_provider(config: &LlmConfig) -> Result<Box<dyn LlmProvider>> {
    match config.provider.as_str() {
        "anthropic" => {
            let api_key = util::resolve_api_key(&config.api_key_env)?;
            let provider = anthropic::AnthropicProvider::new(api_key, config.model.clone(), config.base_url.clone())?;
            Ok(Box::new(provider))
        }
        other => Err(Error::Internal(format!("unknown LLM provider '{other}'"))),
    }
}

//! Shared utility functions for provider adapters.

use chainreview_domain::error::{Error, Result};

/// Convert a [`reqwest::Error`] into the domain [`Error`] type.
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::LlmProvider(e.to_string())
    }
}

/// Resolve the API key from the named environment variable. There is no
/// keychain or plaintext-config fallback: credentials live in the process
/// environment only.
pub fn resolve_api_key(api_key_env: &str) -> Result<String> {
    std::env::var(api_key_env).map_err(|_| {
        Error::AuthMissing(format!("environment variable '{api_key_env}' not set or not valid UTF-8"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_key_from_env() {
        std::env::set_var("CHAINREVIEW_TEST_LLM_KEY", "sk-test");
        let key = resolve_api_key("CHAINREVIEW_TEST_LLM_KEY").unwrap();
        assert_eq!(key, "sk-test");
        std::env::remove_var("CHAINREVIEW_TEST_LLM_KEY");
    }

    #[test]
    fn errors_when_unset() {
        std::env::remove_var("CHAINREVIEW_TEST_LLM_KEY_MISSING");
        let err = resolve_api_key("CHAINREVIEW_TEST_LLM_KEY_MISSING").unwrap_err();
        assert!(matches!(err, Error::AuthMissing(_)));
    }
}

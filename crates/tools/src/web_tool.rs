//! `web_search` — optional, off by default. Only registered when
//! `ToolsConfig::web_search_enabled` is set and a search API key is present
//! in the environment.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use chainreview_domain::error::{Error, Result};

const SEARCH_API_KEY_ENV: &str = "BRAVE_SEARCH_API_KEY";
const SEARCH_ENDPOINT: &str = "https://api.search.brave.com/res/v1/web/search";
const SEARCH_TIMEOUT: Duration = Duration::from_secs(20);

#[derive(Debug, Clone, Serialize)]
pub struct WebSearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

pub fn is_available() -> bool {
    std::env::var(SEARCH_API_KEY_ENV).is_ok()
}

pub async fn web_search(query: &str) -> Result<Vec<WebSearchHit>> {
    let api_key = std::env::var(SEARCH_API_KEY_ENV)
        .map_err(|_| Error::AuthMissing(format!("{SEARCH_API_KEY_ENV} is not set")))?;

    let client = reqwest::Client::builder()
        .timeout(SEARCH_TIMEOUT)
        .build()
        .map_err(|e| Error::Internal(format!("failed to build web search client: {e}")))?;

    let response = client
        .get(SEARCH_ENDPOINT)
        .query(&[("q", query)])
        .header("X-Subscription-Token", api_key)
        .header("Accept", "application/json")
        .send()
        .await
        .map_err(|e| Error::ToolFailure(format!("web search request failed: {e}")))?;

    if !response.status().is_success() {
        return Err(Error::ToolFailure(format!(
            "web search returned status {}",
            response.status()
        )));
    }

    let body: SearchResponse = response
        .json()
        .await
        .map_err(|e| Error::ToolFailure(format!("failed to parse web search response: {e}")))?;

    Ok(body
        .web
        .unwrap_or_default()
        .results
        .into_iter()
        .map(|r| WebSearchHit { title: r.title, url: r.url, snippet: r.description.unwrap_or_default() })
        .collect())
}

#[derive(Debug, Deserialize, Default)]
struct SearchResponse {
    web: Option<WebResults>,
}

#[derive(Debug, Deserialize, Default)]
struct WebResults {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    title: String,
    url: String,
    description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_without_api_key() {
        std::env::remove_var(SEARCH_API_KEY_ENV);
        assert!(!is_available());
    }

    #[tokio::test]
    async fn errors_without_api_key() {
        std::env::remove_var(SEARCH_API_KEY_ENV);
        let err = web_search("rust ownership").await.unwrap_err();
        assert!(matches!(err, Error::AuthMissing(_)));
    }
}

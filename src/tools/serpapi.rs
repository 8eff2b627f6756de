//! Organic web search through SerpApi.

use super::{OrganicResult, SearchRequest, WebSearch};
use crate::errors::CapabilityError;
use async_trait::async_trait;
use serde::Deserialize;

pub const SERPAPI_ENDPOINT: &str = "https://serpapi.com/search.json";

const CAPABILITY: &str = "search";

#[derive(Debug, Clone)]
pub struct SerpApiSearch {
    client: reqwest::Client,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct SerpApiResponse {
    #[serde(default)]
    organic_results: Option<Vec<OrganicResult>>,
    #[serde(default)]
    error: Option<String>,
}

impl SerpApiSearch {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.to_string(),
        }
    }

    /// Query string parameters, without the API key.
    pub fn query_params(request: &SearchRequest) -> Vec<(&'static str, String)> {
        vec![
            ("engine", request.engine.to_string()),
            ("q", request.query.clone()),
            ("location", request.location.clone()),
            ("google_domain", request.domain.clone()),
            ("gl", request.country.clone()),
            ("hl", request.language.clone()),
            ("num", request.num_results.to_string()),
            ("start", request.offset.to_string()),
        ]
    }
}

fn organic_results(body: &str) -> Result<Vec<OrganicResult>, CapabilityError> {
    let response: SerpApiResponse = serde_json::from_str(body)
        .map_err(|e| CapabilityError::failed(CAPABILITY, format!("invalid response body: {e}")))?;
    match response.organic_results {
        Some(results) => Ok(results),
        None => Err(CapabilityError::failed(
            CAPABILITY,
            response
                .error
                .unwrap_or_else(|| "no organic results found".to_string()),
        )),
    }
}

#[async_trait]
impl WebSearch for SerpApiSearch {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<OrganicResult>, CapabilityError> {
        tracing::debug!(query = %request.query, engine = %request.engine, "searching");

        let mut params = Self::query_params(request);
        params.push(("api_key", self.api_key.clone()));

        let response = self
            .client
            .get(SERPAPI_ENDPOINT)
            .query(&params)
            .send()
            .await
            .map_err(|e| CapabilityError::failed(CAPABILITY, format!("request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CapabilityError::failed(CAPABILITY, format!("failed to read body: {e}")))?;
        if !status.is_success() {
            return Err(CapabilityError::failed(
                CAPABILITY,
                format!("HTTP {}: {}", status, body.trim()),
            ));
        }

        let results = organic_results(&body)?;
        tracing::debug!(query = %request.query, results = results.len(), "search finished");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_params_follow_serpapi_names() {
        let params = SerpApiSearch::query_params(&SearchRequest::new("lithium supply"));
        let get = |key: &str| {
            params
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("engine"), Some("google"));
        assert_eq!(get("q"), Some("lithium supply"));
        assert_eq!(get("google_domain"), Some("google.com"));
        assert_eq!(get("gl"), Some("jp"));
        assert_eq!(get("hl"), Some("ja"));
        assert_eq!(get("num"), Some("50"));
        assert_eq!(get("start"), Some("0"));
        assert_eq!(get("api_key"), None);
    }

    #[test]
    fn test_organic_results_extracted() {
        let body = r#"{
            "search_metadata": {"status": "Success"},
            "organic_results": [
                {"position": 1, "title": "A", "link": "https://a.example", "snippet": "alpha"},
                {"position": 2, "title": "B", "link": "https://b.example"}
            ]
        }"#;
        let results = organic_results(body).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].snippet.as_deref(), Some("alpha"));
        assert_eq!(results[1].snippet, None);
    }

    #[test]
    fn test_missing_organic_results_is_error() {
        let err = organic_results(r#"{"search_metadata": {}}"#).unwrap_err();
        assert!(err.to_string().contains("no organic results"));
    }

    #[test]
    fn test_api_error_message_is_surfaced() {
        let err = organic_results(r#"{"error": "Invalid API key."}"#).unwrap_err();
        assert!(err.to_string().contains("Invalid API key."));
    }
}

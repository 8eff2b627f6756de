//! Web research capabilities: search and page fetching.

use crate::errors::CapabilityError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub mod fetch;
pub mod serpapi;

pub use fetch::HttpPageFetcher;
pub use serpapi::SerpApiSearch;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchEngine {
    #[default]
    Google,
    Yahoo,
    Bing,
}

impl fmt::Display for SearchEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchEngine::Google => write!(f, "google"),
            SearchEngine::Yahoo => write!(f, "yahoo"),
            SearchEngine::Bing => write!(f, "bing"),
        }
    }
}

/// One search query plus locale and paging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub engine: SearchEngine,
    pub location: String,
    pub domain: String,
    pub country: String,
    pub language: String,
    pub num_results: u32,
    pub offset: u32,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            query: String::new(),
            engine: SearchEngine::Google,
            location: "Tokyo, Japan".to_string(),
            domain: "google.com".to_string(),
            country: "jp".to_string(),
            language: "ja".to_string(),
            num_results: 50,
            offset: 0,
        }
    }
}

impl SearchRequest {
    pub fn new(query: &str) -> Self {
        Self::default().with_query(query)
    }

    pub fn with_query(mut self, query: &str) -> Self {
        self.query = query.to_string();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganicResult {
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub snippet: Option<String>,
}

/// Extracted text of a fetched page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub title: String,
    pub content: String,
    pub url: String,
}

#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, request: &SearchRequest) -> Result<Vec<OrganicResult>, CapabilityError>;
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Page, CapabilityError>;
}

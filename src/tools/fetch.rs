//! Plain HTTP page fetching with tag stripping.

use super::{Page, PageFetcher};
use crate::errors::CapabilityError;
use anyhow::Context;
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;

const CAPABILITY: &str = "fetch";

static TITLE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());
static HIDDEN_BLOCK_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<script[^>]*>.*?</script>|<style[^>]*>.*?</style>|<head[^>]*>.*?</head>|<!--.*?-->")
        .unwrap()
});
static TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static WHITESPACE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

pub struct HttpPageFetcher {
    client: reqwest::Client,
}

impl HttpPageFetcher {
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("deep-research/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_REGEX.replace_all(text, " ").trim().to_string()
}

/// Build a [`Page`] from an HTML document.
pub fn html_to_page(url: &str, html: &str) -> Page {
    let title = TITLE_REGEX
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| collapse_whitespace(&decode_entities(m.as_str())))
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| url.to_string());

    let visible = HIDDEN_BLOCK_REGEX.replace_all(html, " ");
    let text = TAG_REGEX.replace_all(&visible, " ");
    let content = collapse_whitespace(&decode_entities(&text));

    Page {
        title,
        content,
        url: url.to_string(),
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch(&self, url: &str) -> Result<Page, CapabilityError> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(CapabilityError::failed(
                CAPABILITY,
                format!("unsupported URL: {url}"),
            ));
        }

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CapabilityError::failed(CAPABILITY, format!("{url}: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(CapabilityError::failed(CAPABILITY, format!("{url}: HTTP {status}")));
        }

        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("html"))
            .unwrap_or(true);
        let body = response
            .text()
            .await
            .map_err(|e| CapabilityError::failed(CAPABILITY, format!("{url}: {e}")))?;

        if is_html {
            Ok(html_to_page(url, &body))
        } else {
            Ok(Page {
                title: url.to_string(),
                content: collapse_whitespace(&body),
                url: url.to_string(),
            })
        }
    }
}

//! Payload extraction for structured LLM replies.
//!
//! Agents are asked to answer inside a fenced code block. The payload is the
//! body of the first fenced block when one exists, otherwise the whole
//! trimmed reply. There is no attempt to dig a bare object out of prose.

use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::LazyLock;

static FENCED_BLOCK_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[a-zA-Z0-9_-]*\s*([\s\S]*?)\s*```").unwrap());

/// Body of the first fenced code block in `text`, if any.
pub fn extract_code_block(text: &str) -> Option<&str> {
    FENCED_BLOCK_REGEX
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// The structured payload of a reply: first fenced block, else the trimmed text.
pub fn extract_payload(text: &str) -> &str {
    extract_code_block(text).unwrap_or_else(|| text.trim())
}

/// Deserialize the payload of a reply as JSON.
pub fn parse_fenced_json<T: DeserializeOwned>(text: &str) -> Result<T, serde_json::Error> {
    serde_json::from_str(extract_payload(text))
}

//! Generation through an OpenAI-compatible chat completions endpoint.

use super::{GenerateRequest, TextGenerator};
use crate::errors::CapabilityError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct OpenAiGenerator {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

impl OpenAiGenerator {
    pub fn new(api_base: &str, api_key: &str, model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }

    /// Build the request body for one generation call.
    pub fn chat_request(&self, request: &GenerateRequest) -> ChatRequest {
        let mut messages = Vec::with_capacity(2);
        if !request.instructions.trim().is_empty() {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: request.instructions.trim().to_string(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: request.prompt.clone(),
        });

        ChatRequest {
            model: self.model.clone(),
            messages,
            temperature: request.options.temperature,
            frequency_penalty: request.options.frequency_penalty,
        }
    }
}

fn first_choice(response: ChatResponse, capability: &str) -> Result<String, CapabilityError> {
    response
        .choices
        .into_iter()
        .next()
        .map(|c| c.message.content)
        .ok_or_else(|| CapabilityError::failed(capability, "response contained no choices"))
}

#[async_trait]
impl TextGenerator for OpenAiGenerator {
    async fn generate(&self, request: GenerateRequest) -> Result<String, CapabilityError> {
        let capability = format!("generate[{}]", request.agent);
        let body = self.chat_request(&request);

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CapabilityError::failed(&capability, format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(CapabilityError::failed(
                &capability,
                format!("HTTP {}: {}", status, detail.trim()),
            ));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| CapabilityError::failed(&capability, format!("invalid response body: {e}")))?;
        first_choice(parsed, &capability)
    }
}

//! Text-generation capability and the named agents built on it.
//!
//! A [`TextGenerator`] is an opaque prompt-in, text-out backend. An [`Agent`]
//! binds a generator to a role: a name, standing instructions and sampling
//! options. Each pipeline role (outline writer, phase judge, ...) is one agent.

use crate::errors::CapabilityError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod command;
pub mod openai;

pub use command::CommandGenerator;
pub use openai::OpenAiGenerator;

/// Sampling controls forwarded to backends that support them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
}

impl GenerateOptions {
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_frequency_penalty(mut self, penalty: f32) -> Self {
        self.frequency_penalty = Some(penalty);
        self
    }
}

/// One generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    /// Name of the calling agent, for logging and routing.
    pub agent: String,
    pub instructions: String,
    pub prompt: String,
    pub options: GenerateOptions,
}

#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: GenerateRequest) -> Result<String, CapabilityError>;
}

/// A named generation role.
#[derive(Clone)]
pub struct Agent {
    name: String,
    instructions: String,
    options: GenerateOptions,
    generator: Arc<dyn TextGenerator>,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Agent {
    pub fn new(name: &str, instructions: &str, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            name: name.to_string(),
            instructions: instructions.to_string(),
            options: GenerateOptions::default(),
            generator,
        }
    }

    pub fn with_options(mut self, options: GenerateOptions) -> Self {
        self.options = options;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn options(&self) -> GenerateOptions {
        self.options
    }

    pub async fn generate(&self, prompt: &str) -> Result<String, CapabilityError> {
        tracing::trace!(agent = %self.name, prompt_chars = prompt.len(), "generating");
        let text = self
            .generator
            .generate(GenerateRequest {
                agent: self.name.clone(),
                instructions: self.instructions.clone(),
                prompt: prompt.to_string(),
                options: self.options,
            })
            .await?;
        tracing::trace!(agent = %self.name, output_chars = text.len(), "generated");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingGenerator {
        seen: Mutex<Vec<GenerateRequest>>,
    }

    #[async_trait]
    impl TextGenerator for RecordingGenerator {
        async fn generate(&self, request: GenerateRequest) -> Result<String, CapabilityError> {
            let reply = format!("{} says hi", request.agent);
            self.seen.lock().unwrap().push(request);
            Ok(reply)
        }
    }

    #[tokio::test]
    async fn test_agent_forwards_role_and_options() {
        let generator = Arc::new(RecordingGenerator {
            seen: Mutex::new(Vec::new()),
        });
        let agent = Agent::new("Content-Writer", "Write chapters.", generator.clone())
            .with_options(GenerateOptions::default().with_temperature(0.5));

        let text = agent.generate("Chapter 1").await.unwrap();
        assert_eq!(text, "Content-Writer says hi");

        let seen = generator.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].instructions, "Write chapters.");
        assert_eq!(seen[0].prompt, "Chapter 1");
        assert_eq!(seen[0].options.temperature, Some(0.5));
        assert_eq!(seen[0].options.frequency_penalty, None);
    }

    #[test]
    fn test_generate_options_builder() {
        let options = GenerateOptions::default()
            .with_temperature(0.5)
            .with_frequency_penalty(0.5);
        assert_eq!(options.temperature, Some(0.5));
        assert_eq!(options.frequency_penalty, Some(0.5));
    }
}

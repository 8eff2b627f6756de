//! The named agents of a research run.

use crate::llm::{Agent, GenerateOptions, TextGenerator};
use crate::phase::Producer;
use crate::prompts;
use std::sync::Arc;

/// Every role the workflow needs, all backed by generators.
#[derive(Clone)]
pub struct ResearchAgents {
    pub outline_writer: Agent,
    pub outline_reviewer: Agent,
    pub chapter_parser: Agent,
    pub phase_judge: Agent,
    pub content_reviewer: Agent,
    pub final_report_writer: Agent,
    pub final_report_reviewer: Agent,
    /// Producer for chapter content. The plain content writer unless replaced.
    pub content_producer: Arc<dyn Producer>,
}

/// Content writer agent with its sampling options.
pub fn content_writer(generator: Arc<dyn TextGenerator>, options: GenerateOptions) -> Agent {
    Agent::new(
        "Content-Writer",
        prompts::CONTENT_WRITER_INSTRUCTIONS,
        generator,
    )
    .with_options(options)
}

impl ResearchAgents {
    /// All roles on one generator. `content_options` applies to the content writer.
    pub fn new(generator: Arc<dyn TextGenerator>, content_options: GenerateOptions) -> Self {
        let agent = |name: &str, instructions: &str| Agent::new(name, instructions, generator.clone());
        Self {
            outline_writer: agent("Outline-Writer", prompts::OUTLINE_WRITER_INSTRUCTIONS),
            outline_reviewer: agent("Outline-Reviewer", prompts::OUTLINE_REVIEWER_INSTRUCTIONS),
            chapter_parser: agent("Chapter-Parser", prompts::CHAPTER_PARSER_INSTRUCTIONS),
            phase_judge: agent("Phase-Judge", prompts::PHASE_JUDGE_INSTRUCTIONS),
            content_reviewer: agent("Content-Reviewer", prompts::CONTENT_REVIEWER_INSTRUCTIONS),
            final_report_writer: agent(
                "Final-Report-Writer",
                prompts::FINAL_REPORT_WRITER_INSTRUCTIONS,
            ),
            final_report_reviewer: agent(
                "Final-Report-Reviewer",
                prompts::FINAL_REPORT_REVIEWER_INSTRUCTIONS,
            ),
            content_producer: Arc::new(content_writer(generator.clone(), content_options)),
        }
    }

    pub fn with_content_producer(mut self, producer: Arc<dyn Producer>) -> Self {
        self.content_producer = producer;
        self
    }
}

//! Develops every chapter of an outline through the content phase.

use super::{Chapter, ChapterContent, join_contents, sort_by_number};
use crate::batch::BatchRunner;
use crate::errors::WorkflowError;
use crate::phase::{PhaseController, WorkUnit};
use crate::prompts::content_writer_prompt;

pub const DEFAULT_CHAPTER_CONCURRENCY: usize = 3;

pub struct ChapterPipeline {
    controller: PhaseController,
    runner: BatchRunner,
}

impl ChapterPipeline {
    /// `controller` runs the content phase for a single chapter.
    pub fn new(controller: PhaseController) -> Self {
        Self {
            controller,
            runner: BatchRunner::new(DEFAULT_CHAPTER_CONCURRENCY),
        }
    }

    pub fn with_runner(mut self, runner: BatchRunner) -> Self {
        self.runner = runner;
        self
    }

    /// Develop all chapters and return them sorted by number.
    pub async fn develop_chapters(
        &self,
        chapters: Vec<Chapter>,
    ) -> Result<Vec<ChapterContent>, WorkflowError> {
        tracing::info!(
            chapters = chapters.len(),
            width = self.runner.width(),
            "developing chapters"
        );

        let mut contents = self
            .runner
            .run(chapters, |chapter| self.develop_one(chapter))
            .await?;
        sort_by_number(&mut contents);
        Ok(contents)
    }

    /// Develop all chapters and concatenate their texts in chapter order.
    pub async fn develop(&self, chapters: Vec<Chapter>) -> Result<String, WorkflowError> {
        let contents = self.develop_chapters(chapters).await?;
        Ok(join_contents(&contents))
    }

    async fn develop_one(&self, chapter: Chapter) -> Result<ChapterContent, WorkflowError> {
        let unit = WorkUnit::new(&chapter.title).with_label(chapter.label());
        let prompt = content_writer_prompt(&chapter.title, &chapter.description);
        let result = self
            .controller
            .run_unit(&unit, &prompt)
            .await
            .map_err(|source| {
                tracing::error!(
                    chapter = chapter.number,
                    attempt = source.attempt(),
                    error = %source,
                    "chapter development failed"
                );
                WorkflowError::Chapter {
                    number: chapter.number,
                    source,
                }
            })?;
        Ok(ChapterContent { chapter, result })
    }
}

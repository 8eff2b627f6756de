//! Sequences the phases of one research run.

use super::agents::ResearchAgents;
use crate::audit::{RunManifest, streams};
use crate::batch::{BatchRunner, DEFAULT_COOLDOWN};
use crate::chapters::{
    Chapter, ChapterContent, ChapterPipeline, duplicate_numbers, join_contents, parse_chapters,
};
use crate::errors::WorkflowError;
use crate::llm::Agent;
use crate::phase::controller::DEFAULT_MAX_ATTEMPTS;
use crate::phase::{
    JudgeReferee, Phase, PhaseController, PhaseResult, ReflectionReviewer, RunContext, WorkUnit,
};
use crate::prompts;
use std::sync::Arc;
use std::time::Duration;

/// Knobs shared by all phases of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkflowSettings {
    pub max_attempts: u32,
    pub chapter_concurrency: usize,
    pub batch_cooldown: Duration,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            chapter_concurrency: crate::chapters::pipeline::DEFAULT_CHAPTER_CONCURRENCY,
            batch_cooldown: DEFAULT_COOLDOWN,
        }
    }
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct WorkflowOutput {
    /// The accepted final report.
    pub report: String,
    pub outline: PhaseResult,
    pub chapters: Vec<ChapterContent>,
    /// Chapter texts joined in chapter order.
    pub draft: String,
    pub final_report: PhaseResult,
    pub manifest: RunManifest,
}

fn outline_review_prompt(_subject: &str, outline: &str) -> String {
    prompts::outline_reflection_prompt(outline)
}

fn final_report_review_prompt(_subject: &str, report: &str) -> String {
    prompts::final_report_reflection_prompt(report)
}

pub struct WorkflowOrchestrator {
    outline: PhaseController,
    chapter_parser: Agent,
    chapters: ChapterPipeline,
    final_report: PhaseController,
    ctx: RunContext,
}

impl WorkflowOrchestrator {
    pub fn new(agents: ResearchAgents, ctx: RunContext, settings: WorkflowSettings) -> Self {
        let judge = Arc::new(JudgeReferee::new(agents.phase_judge.clone()));

        let outline = Phase::new(
            "outline",
            Arc::new(agents.outline_writer),
            Arc::new(ReflectionReviewer::new(
                agents.outline_reviewer,
                outline_review_prompt,
            )),
            judge.clone(),
        );
        let content = Phase::new(
            "content",
            agents.content_producer,
            Arc::new(ReflectionReviewer::new(
                agents.content_reviewer,
                prompts::content_reflection_prompt,
            )),
            judge.clone(),
        );
        let final_report = Phase::new(
            "final-report",
            Arc::new(agents.final_report_writer),
            Arc::new(ReflectionReviewer::new(
                agents.final_report_reviewer,
                final_report_review_prompt,
            )),
            judge,
        );

        let controller = |phase: Phase, stream: &str| {
            PhaseController::new(phase, ctx.clone(), stream).with_max_attempts(settings.max_attempts)
        };
        let chapters = ChapterPipeline::new(controller(content, streams::CONTENT)).with_runner(
            BatchRunner::new(settings.chapter_concurrency).with_cooldown(settings.batch_cooldown),
        );
        let outline = controller(outline, streams::OUTLINE);
        let final_report = controller(final_report, streams::FINAL_REPORT);

        Self {
            outline,
            chapter_parser: agents.chapter_parser,
            chapters,
            final_report,
            ctx,
        }
    }

    /// Run the whole workflow for `query`.
    pub async fn run(&self, query: &str) -> Result<WorkflowOutput, WorkflowError> {
        let mut manifest = RunManifest::new(query);
        tracing::info!(run_id = %manifest.run_id, query, "research run started");

        self.reset(streams::OUTLINE).await;
        let outline = self
            .outline
            .run_unit(&WorkUnit::new(query), &prompts::outline_writer_prompt(query))
            .await
            .map_err(WorkflowError::Outline)?;
        manifest.phases.push(outline.summary("outline"));

        let chapters = self.parse_chapters(&outline.text).await?;

        self.reset(streams::CONTENT).await;
        let contents = self.chapters.develop_chapters(chapters).await?;
        manifest.chapters = contents.iter().map(ChapterContent::summary).collect();
        let draft = join_contents(&contents);
        self.write(streams::CONTENT_DRAFT, &draft).await;

        self.reset(streams::FINAL_REPORT).await;
        let final_report = self
            .final_report
            .run_unit(&WorkUnit::new(query), &prompts::final_report_writer_prompt(&draft))
            .await
            .map_err(WorkflowError::FinalReport)?;
        manifest.phases.push(final_report.summary("final-report"));
        self.write(streams::COMPLETED_REPORT, &final_report.text).await;

        manifest.finish();
        match serde_json::to_string_pretty(&manifest) {
            Ok(json) => self.write(streams::MANIFEST, &json).await,
            Err(e) => tracing::warn!(error = %e, "failed to serialize run manifest"),
        }

        let degraded = manifest.degraded_phases().len()
            + manifest
                .chapters
                .iter()
                .filter(|c| c.exhausted || c.forced_acceptance)
                .count();
        tracing::info!(
            run_id = %manifest.run_id,
            chapters = contents.len(),
            degraded,
            report_chars = final_report.text.chars().count(),
            "research run finished"
        );

        Ok(WorkflowOutput {
            report: final_report.text.clone(),
            outline,
            chapters: contents,
            draft,
            final_report,
            manifest,
        })
    }

    async fn parse_chapters(&self, outline: &str) -> Result<Vec<Chapter>, WorkflowError> {
        let parser = &self.chapter_parser;
        let raw = self
            .ctx
            .policy
            .call("chapter-parser", || parser.generate(outline))
            .await
            .map_err(WorkflowError::ChapterParser)?;

        let chapters = match parse_chapters(&raw) {
            Ok(chapters) => chapters,
            Err(source) => {
                self.write(streams::CHAPTERS, &raw).await;
                return Err(WorkflowError::ChapterParse { raw, source });
            }
        };
        match serde_json::to_string_pretty(&chapters) {
            Ok(json) => self.write(streams::CHAPTERS, &json).await,
            Err(e) => tracing::warn!(error = %e, "failed to serialize chapter list"),
        }

        if chapters.is_empty() {
            return Err(WorkflowError::NoChapters);
        }
        let duplicates = duplicate_numbers(&chapters);
        if !duplicates.is_empty() {
            tracing::warn!(?duplicates, "outline repeats chapter numbers, keeping all");
        }
        tracing::info!(chapters = chapters.len(), "outline parsed");
        Ok(chapters)
    }

    async fn reset(&self, stream: &str) {
        self.write(stream, "").await;
    }

    async fn write(&self, stream: &str, text: &str) {
        if let Err(e) = self.ctx.audit.write(stream, text).await {
            tracing::warn!(stream, error = %e, "failed to write audit stream");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::errors::CapabilityError;
    use crate::llm::{GenerateOptions, GenerateRequest, TextGenerator};
    use crate::policy::CallPolicy;
    use async_trait::async_trait;
    use std::sync::Mutex;

    type Reply = Box<dyn Fn(&GenerateRequest) -> Result<String, CapabilityError> + Send + Sync>;

    /// Answers by agent name; later registrations win. Records every request.
    struct ScriptedGenerator {
        replies: Vec<(&'static str, Reply)>,
        seen: Mutex<Vec<GenerateRequest>>,
    }

    impl ScriptedGenerator {
        fn new() -> Self {
            Self {
                replies: Vec::new(),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn on<F>(mut self, agent: &'static str, reply: F) -> Self
        where
            F: Fn(&GenerateRequest) -> Result<String, CapabilityError> + Send + Sync + 'static,
        {
            self.replies.insert(0, (agent, Box::new(reply)));
            self
        }

        fn prompts_for(&self, agent: &str) -> Vec<String> {
            self.seen
                .lock()
                .unwrap()
                .iter()
                .filter(|r| r.agent == agent)
                .map(|r| r.prompt.clone())
                .collect()
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, request: GenerateRequest) -> Result<String, CapabilityError> {
            self.seen.lock().unwrap().push(request.clone());
            match self.replies.iter().find(|(agent, _)| *agent == request.agent) {
                Some((_, reply)) => reply(&request),
                None => Ok("No major issues.".to_string()),
            }
        }
    }

    const PROCEED: &str = "```json\n{\"action\":\"proceed\",\"reason\":\"ok\"}\n```";

    fn happy_generator(chapters_json: &'static str) -> ScriptedGenerator {
        ScriptedGenerator::new()
            .on("Outline-Writer", |_| Ok("1. Intro\n2. Body".into()))
            .on("Chapter-Parser", move |_| Ok(chapters_json.into()))
            .on("Phase-Judge", |_| Ok(PROCEED.into()))
            .on("Content-Writer", |r| {
                if r.prompt.contains("Chapter title: Intro") {
                    Ok("INTRO TEXT".into())
                } else {
                    Ok("BODY TEXT".into())
                }
            })
            .on("Final-Report-Writer", |_| Ok("FINAL REPORT".into()))
    }

    const TWO_CHAPTERS: &str = "```json\n{\"chapters\":[{\"number\":2,\"title\":\"Body\",\"description\":\"details\"},{\"number\":1,\"title\":\"Intro\",\"description\":\"\"}]}\n```";

    fn orchestrator(
        generator: Arc<ScriptedGenerator>,
        sink: Arc<MemoryAuditSink>,
    ) -> WorkflowOrchestrator {
        let agents = ResearchAgents::new(
            generator,
            GenerateOptions::default().with_temperature(0.5).with_frequency_penalty(0.5),
        );
        let settings = WorkflowSettings {
            batch_cooldown: Duration::ZERO,
            ..WorkflowSettings::default()
        };
        WorkflowOrchestrator::new(agents, RunContext::new(sink, CallPolicy::unbounded()), settings)
    }

    #[tokio::test]
    async fn test_full_run_produces_ordered_report() {
        let generator = Arc::new(happy_generator(TWO_CHAPTERS));
        let sink = Arc::new(MemoryAuditSink::new());
        let workflow = orchestrator(generator.clone(), sink.clone());

        let output = workflow.run("solid-state batteries").await.unwrap();

        assert_eq!(output.report, "FINAL REPORT");
        assert_eq!(output.draft, "INTRO TEXT\n\nBODY TEXT");
        assert_eq!(output.outline.attempts, 1);
        let numbers: Vec<i64> = output.chapters.iter().map(|c| c.chapter.number).collect();
        assert_eq!(numbers, vec![1, 2]);

        let final_prompts = generator.prompts_for("Final-Report-Writer");
        assert!(final_prompts[0].contains("INTRO TEXT\n\nBODY TEXT"));
        let parser_prompts = generator.prompts_for("Chapter-Parser");
        assert_eq!(parser_prompts, vec!["1. Intro\n2. Body"]);

        let phases: Vec<&str> = output.manifest.phases.iter().map(|p| p.phase.as_str()).collect();
        assert_eq!(phases, vec!["outline", "final-report"]);
        assert_eq!(output.manifest.chapters.len(), 2);
        assert!(output.manifest.ended_at.is_some());

        assert_eq!(
            sink.stream_names().await,
            vec![
                "chapters.json",
                "completed_report.md",
                "content.md",
                "final_content_draft.md",
                "final_report.md",
                "outline.md",
                "run.json",
            ]
        );
        assert_eq!(sink.contents("completed_report.md").await.as_deref(), Some("FINAL REPORT"));
        assert_eq!(
            sink.contents("final_content_draft.md").await.as_deref(),
            Some("INTRO TEXT\n\nBODY TEXT")
        );
        let manifest = sink.contents("run.json").await.unwrap();
        assert!(manifest.contains("solid-state batteries"));
    }

    #[tokio::test]
    async fn test_content_writer_gets_sampling_options() {
        let generator = Arc::new(happy_generator(TWO_CHAPTERS));
        let workflow = orchestrator(generator.clone(), Arc::new(MemoryAuditSink::new()));
        workflow.run("q").await.unwrap();

        let seen = generator.seen.lock().unwrap();
        let writer = seen.iter().find(|r| r.agent == "Content-Writer").unwrap();
        assert_eq!(writer.options.temperature, Some(0.5));
        assert_eq!(writer.options.frequency_penalty, Some(0.5));
        let outline = seen.iter().find(|r| r.agent == "Outline-Writer").unwrap();
        assert_eq!(outline.options, GenerateOptions::default());
    }

    #[tokio::test]
    async fn test_empty_chapter_list_is_fatal() {
        let generator = Arc::new(happy_generator("```json\n{\"chapters\": []}\n```"));
        let workflow = orchestrator(generator.clone(), Arc::new(MemoryAuditSink::new()));

        let err = workflow.run("q").await.unwrap_err();
        assert!(matches!(err, WorkflowError::NoChapters));
        assert!(generator.prompts_for("Content-Writer").is_empty());
    }

    #[tokio::test]
    async fn test_unparseable_chapter_list_is_fatal() {
        let generator = Arc::new(happy_generator("Chapter 1: Intro, Chapter 2: Body"));
        let sink = Arc::new(MemoryAuditSink::new());
        let workflow = orchestrator(generator, sink.clone());

        let err = workflow.run("q").await.unwrap_err();
        match err {
            WorkflowError::ChapterParse { raw, .. } => assert!(raw.contains("Chapter 1")),
            other => panic!("Expected ChapterParse, got {other:?}"),
        }
        assert!(sink.contents("chapters.json").await.unwrap().contains("Chapter 1"));
        assert!(sink.contents("completed_report.md").await.is_none());
    }

    #[tokio::test]
    async fn test_chapter_parser_failure_is_fatal() {
        let generator = Arc::new(
            happy_generator(TWO_CHAPTERS)
                .on("Chapter-Parser", |_| Err(CapabilityError::failed("generate", "offline"))),
        );
        let workflow = orchestrator(generator, Arc::new(MemoryAuditSink::new()));

        let err = workflow.run("q").await.unwrap_err();
        assert!(matches!(err, WorkflowError::ChapterParser(_)));
    }

    #[tokio::test]
    async fn test_prose_judgment_is_recorded_as_forced() {
        let generator = Arc::new(
            ScriptedGenerator::new()
                .on("Chapter-Parser", |_| Ok(TWO_CHAPTERS.into()))
                .on("Phase-Judge", |_| Ok("Seems fine overall.".into())),
        );
        let workflow = orchestrator(generator, Arc::new(MemoryAuditSink::new()));

        let output = workflow.run("q").await.unwrap();
        assert!(output.outline.forced_acceptance);
        assert!(output.final_report.forced_acceptance);
        assert!(output.chapters.iter().all(|c| c.result.forced_acceptance));
        assert_eq!(output.manifest.degraded_phases().len(), 2);
    }

    #[tokio::test]
    async fn test_outline_revision_feeds_prior_outline() {
        let judge_calls = Arc::new(Mutex::new(0u32));
        let calls = judge_calls.clone();
        let generator = Arc::new(
            happy_generator(TWO_CHAPTERS)
                .on("Outline-Reviewer", |_| Ok("Add a conclusion chapter.".into()))
                .on("Phase-Judge", move |r| {
                    let mut n = calls.lock().unwrap();
                    *n += 1;
                    if *n == 1 && r.prompt.contains("[PHASE]:\noutline") {
                        Ok("{\"action\":\"revise\",\"reason\":\"missing conclusion\"}".into())
                    } else {
                        Ok(PROCEED.into())
                    }
                }),
        );
        let sink = Arc::new(MemoryAuditSink::new());
        let workflow = orchestrator(generator.clone(), sink.clone());

        let output = workflow.run("q").await.unwrap();
        assert_eq!(output.outline.attempts, 2);

        let outline_prompts = generator.prompts_for("Outline-Writer");
        assert_eq!(
            outline_prompts[1],
            prompts::build_revision_prompt("1. Intro\n2. Body", "Add a conclusion chapter.")
        );
        let outline_log = sink.contents("outline.md").await.unwrap();
        assert!(outline_log.contains("==== revision reason 1 ====\n\nmissing conclusion"));
        assert_eq!(*judge_calls.lock().unwrap(), 5);
    }
}

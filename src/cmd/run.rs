//! Research run command: `deep-research run`.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use deep_research::audit::FileAuditSink;
use deep_research::batch::BatchRunner;
use deep_research::config::{CliOverrides, Config, LlmBackend};
use deep_research::llm::{CommandGenerator, OpenAiGenerator, TextGenerator};
use deep_research::orchestrator::{ResearchAgents, WorkflowOrchestrator, WorkflowSettings, agents};
use deep_research::phase::RunContext;
use deep_research::policy::CallPolicy;
use deep_research::research::ResearchingWriter;
use deep_research::tools::fetch::HttpPageFetcher;
use deep_research::tools::serpapi::SerpApiSearch;
use tokio_util::sync::CancellationToken;

fn build_generator(config: &Config) -> Result<Arc<dyn TextGenerator>> {
    let llm = &config.toml.llm;
    let generator: Arc<dyn TextGenerator> = match config.toml.backend()? {
        LlmBackend::Command => Arc::new(CommandGenerator::new(&llm.command, llm.args.clone())),
        LlmBackend::OpenAi => Arc::new(OpenAiGenerator::new(
            &llm.api_base,
            &config.llm_api_key()?,
            &llm.model,
        )),
    };
    Ok(generator)
}

fn build_agents(
    config: &Config,
    generator: Arc<dyn TextGenerator>,
    policy: &CallPolicy,
) -> Result<ResearchAgents> {
    let options = config.content_options();
    let agents = ResearchAgents::new(generator.clone(), options);
    let research = &config.toml.research;
    if !research.enabled {
        return Ok(agents);
    }

    let search = Arc::new(SerpApiSearch::new(&config.search_api_key()?));
    let fetcher = Arc::new(HttpPageFetcher::new()?);
    let writer = ResearchingWriter::new(agents::content_writer(generator, options), search, fetcher)
        .with_search_template(config.search_template())
        .with_pages_per_subject(research.pages_per_chapter)
        .with_excerpt_chars(research.excerpt_chars)
        .with_runner(BatchRunner::new(research.fetch_concurrency).with_cooldown(config.batch_cooldown()))
        .with_policy(policy.clone());
    tracing::info!(
        pages = research.pages_per_chapter,
        engine = %config.toml.search.engine,
        "web research enabled"
    );
    Ok(agents.with_content_producer(Arc::new(writer)))
}

pub async fn cmd_run(
    config_path: Option<&Path>,
    overrides: &CliOverrides,
    query: &str,
    output: Option<&Path>,
) -> Result<()> {
    let config = Config::load(config_path)?.with_cli_overrides(overrides);
    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling run");
            signal_token.cancel();
        }
    });

    let policy = config.call_policy(cancel);
    let generator = build_generator(&config)?;
    let agents = build_agents(&config, generator, &policy)?;

    let workspace = config.workspace_dir().to_path_buf();
    std::fs::create_dir_all(&workspace)
        .with_context(|| format!("Failed to create workspace dir: {}", workspace.display()))?;
    let ctx = RunContext::new(Arc::new(FileAuditSink::new(&workspace)), policy);
    let settings = WorkflowSettings {
        max_attempts: config.max_attempts(),
        chapter_concurrency: config.chapter_concurrency(),
        batch_cooldown: config.batch_cooldown(),
    };

    let orchestrator = WorkflowOrchestrator::new(agents, ctx, settings);
    let result = orchestrator
        .run(query)
        .await
        .with_context(|| format!("Research run failed for query: {}", query))?;

    match output {
        Some(path) => {
            std::fs::write(path, &result.report)
                .with_context(|| format!("Failed to write report: {}", path.display()))?;
            eprintln!("Report written to {}", path.display());
        }
        None => println!("{}", result.report),
    }

    let degraded = result.manifest.degraded_phases();
    if !degraded.is_empty() {
        eprintln!();
        eprintln!("Some phases were accepted without approval:");
        for phase in degraded {
            let why = if phase.forced_acceptance {
                "judgment could not be parsed"
            } else {
                "attempts exhausted"
            };
            eprintln!("  - {} after {} attempt(s): {}", phase.phase, phase.attempts, why);
        }
    }
    eprintln!("Audit files: {}", workspace.display());

    Ok(())
}

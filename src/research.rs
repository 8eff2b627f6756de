//! Content producer that grounds each chapter in web sources.
//!
//! For every subject the writer searches once, fetches the top pages and
//! appends their excerpts to the writer prompt. Research happens in
//! [`Producer::prepare`] under the writer's own [`CallPolicy`], so only the
//! generation step runs under the controller's policy. Revisions and
//! concurrent chapters with the same subject share one lookup.

use crate::batch::BatchRunner;
use crate::errors::CapabilityError;
use crate::llm::Agent;
use crate::phase::Producer;
use crate::policy::CallPolicy;
use crate::tools::{OrganicResult, PageFetcher, SearchRequest, WebSearch};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};

pub const DEFAULT_PAGES_PER_SUBJECT: usize = 3;
pub const DEFAULT_EXCERPT_CHARS: usize = 4000;

/// One source quoted in the writer prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub title: String,
    pub url: String,
    pub excerpt: String,
    /// Fetching failed and the excerpt is the search snippet.
    pub from_snippet: bool,
}

pub struct ResearchingWriter {
    writer: Agent,
    search: Arc<dyn WebSearch>,
    fetcher: Arc<dyn PageFetcher>,
    template: SearchRequest,
    pages_per_subject: usize,
    excerpt_chars: usize,
    runner: BatchRunner,
    policy: CallPolicy,
    cache: Mutex<HashMap<String, Arc<OnceCell<Arc<String>>>>>,
}

impl ResearchingWriter {
    pub fn new(writer: Agent, search: Arc<dyn WebSearch>, fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            writer,
            search,
            fetcher,
            template: SearchRequest::default(),
            pages_per_subject: DEFAULT_PAGES_PER_SUBJECT,
            excerpt_chars: DEFAULT_EXCERPT_CHARS,
            runner: BatchRunner::new(DEFAULT_PAGES_PER_SUBJECT),
            policy: CallPolicy::unbounded(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Locale and paging settings; the query is replaced per subject.
    pub fn with_search_template(mut self, template: SearchRequest) -> Self {
        self.template = template;
        self
    }

    pub fn with_pages_per_subject(mut self, pages: usize) -> Self {
        self.pages_per_subject = pages;
        self
    }

    pub fn with_excerpt_chars(mut self, chars: usize) -> Self {
        self.excerpt_chars = chars;
        self
    }

    pub fn with_runner(mut self, runner: BatchRunner) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_policy(mut self, policy: CallPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Rendered sources section for `subject`, cached per subject.
    ///
    /// A failed lookup is not cached; the next call for the subject retries it.
    pub async fn sources_for(&self, subject: &str) -> Result<Arc<String>, CapabilityError> {
        let cell = self
            .cache
            .lock()
            .await
            .entry(subject.to_string())
            .or_default()
            .clone();
        if let Some(cached) = cell.get() {
            tracing::trace!(subject, "using cached sources");
            return Ok(cached.clone());
        }
        cell.get_or_try_init(|| self.research(subject))
            .await
            .cloned()
    }

    async fn research(&self, subject: &str) -> Result<Arc<String>, CapabilityError> {
        let request = self.template.clone().with_query(subject);
        let search = &self.search;
        let results = self
            .policy
            .call("search", || search.search(&request))
            .await?;

        let top: Vec<OrganicResult> = results
            .into_iter()
            .filter(|r| !r.link.trim().is_empty())
            .take(self.pages_per_subject)
            .collect();
        tracing::info!(subject, pages = top.len(), "fetching sources");

        let sources = self.runner.run(top, |result| self.collect_source(result)).await?;
        Ok(Arc::new(render_sources(&sources)))
    }

    async fn collect_source(&self, result: OrganicResult) -> Result<Source, CapabilityError> {
        let fetcher = &self.fetcher;
        match self.policy.call("fetch", || fetcher.fetch(&result.link)).await {
            Ok(page) => Ok(Source {
                title: page.title,
                url: result.link,
                excerpt: truncate_chars(&page.content, self.excerpt_chars),
                from_snippet: false,
            }),
            Err(e @ (CapabilityError::Cancelled { .. } | CapabilityError::DeadlineExceeded { .. })) => {
                Err(e)
            }
            Err(e) => {
                tracing::warn!(url = %result.link, error = %e, "fetch failed, using search snippet");
                Ok(Source {
                    title: result.title,
                    url: result.link,
                    excerpt: result.snippet.unwrap_or_default(),
                    from_snippet: true,
                })
            }
        }
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_string(),
    }
}

/// Markdown block appended to the writer prompt. Empty when there are no sources.
pub fn render_sources(sources: &[Source]) -> String {
    if sources.is_empty() {
        return String::new();
    }
    let mut out = String::from(
        "## Sources\n\nUse the following sources and cite them by number and URL.\n",
    );
    for (i, source) in sources.iter().enumerate() {
        out.push_str(&format!("\n[{}] {}\nURL: {}\n", i + 1, source.title, source.url));
        if !source.excerpt.is_empty() {
            out.push_str(&format!("{}\n", source.excerpt));
        }
    }
    out
}

#[async_trait]
impl Producer for ResearchingWriter {
    async fn prepare(&self, subject: &str, input: &str) -> Result<String, CapabilityError> {
        let sources = self.sources_for(subject).await?;
        if sources.is_empty() {
            return Ok(input.to_string());
        }
        Ok(format!("{input}\n\n{sources}"))
    }

    async fn produce(&self, _subject: &str, prompt: &str) -> Result<String, CapabilityError> {
        self.writer.generate(prompt).await
    }
}

//! Configuration for deep-research.
//!
//! Settings are read from `research.toml` and layered:
//! file → environment → CLI.
//!
//! # Configuration File Format
//!
//! ```toml
//! [workflow]
//! max_attempts = 3
//! chapter_concurrency = 3
//! batch_cooldown_ms = 1000
//! workspace_dir = "workspace"
//!
//! [llm]
//! backend = "command"          # "command" | "openai"
//! command = "claude"
//! args = ["--print"]
//! model = "gpt-4o"
//! api_base = "https://api.openai.com/v1"
//! api_key_env = "OPENAI_API_KEY"
//! content_temperature = 0.5
//! content_frequency_penalty = 0.5
//!
//! [limits]
//! call_timeout_secs = 600
//! workflow_timeout_secs = 7200 # 0 disables the deadline
//! transient_retries = 2
//! retry_backoff_ms = 2000
//!
//! [research]
//! enabled = false
//! pages_per_chapter = 3
//! fetch_concurrency = 3
//! excerpt_chars = 4000
//!
//! [search]
//! engine = "google"
//! location = "Tokyo, Japan"
//! domain = "google.com"
//! country = "jp"
//! language = "ja"
//! num_results = 50
//! offset = 0
//! api_key_env = "SERPAPI_API_KEY"
//! ```
//!
//! Environment overrides: `WORKSPACE_DIR` replaces `workflow.workspace_dir`,
//! `RESEARCH_LLM_CMD` replaces `llm.command`.

use crate::llm::GenerateOptions;
use crate::policy::CallPolicy;
use crate::tools::{SearchEngine, SearchRequest};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const CONFIG_FILE_NAME: &str = "research.toml";
pub const WORKSPACE_DIR_ENV: &str = "WORKSPACE_DIR";
pub const LLM_CMD_ENV: &str = "RESEARCH_LLM_CMD";

/// Which text-generation backend drives the agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    /// An LLM CLI fed on stdin.
    Command,
    /// An OpenAI-compatible HTTP endpoint.
    OpenAi,
}

impl std::fmt::Display for LlmBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmBackend::Command => write!(f, "command"),
            LlmBackend::OpenAi => write!(f, "openai"),
        }
    }
}

impl std::str::FromStr for LlmBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "command" => Ok(LlmBackend::Command),
            "openai" => Ok(LlmBackend::OpenAi),
            _ => anyhow::bail!("Invalid llm backend '{}'. Valid values: command, openai", s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSection {
    /// Attempts per phase before the last output is accepted as is
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_chapter_concurrency")]
    pub chapter_concurrency: usize,
    #[serde(default = "default_batch_cooldown_ms")]
    pub batch_cooldown_ms: u64,
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: PathBuf,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_chapter_concurrency() -> usize {
    3
}

fn default_batch_cooldown_ms() -> u64 {
    1000
}

fn default_workspace_dir() -> PathBuf {
    PathBuf::from("workspace")
}

impl Default for WorkflowSection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            chapter_concurrency: default_chapter_concurrency(),
            batch_cooldown_ms: default_batch_cooldown_ms(),
            workspace_dir: default_workspace_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSection {
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Program spawned by the command backend
    #[serde(default = "default_command")]
    pub command: String,
    #[serde(default = "default_command_args")]
    pub args: Vec<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_sampling")]
    pub content_temperature: f32,
    #[serde(default = "default_sampling")]
    pub content_frequency_penalty: f32,
}

fn default_backend() -> String {
    "command".to_string()
}

fn default_command() -> String {
    "claude".to_string()
}

fn default_command_args() -> Vec<String> {
    vec!["--print".to_string()]
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_sampling() -> f32 {
    0.5
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            command: default_command(),
            args: default_command_args(),
            model: default_model(),
            api_base: default_api_base(),
            api_key_env: default_api_key_env(),
            content_temperature: default_sampling(),
            content_frequency_penalty: default_sampling(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsSection {
    /// Per-call timeout; 0 disables it
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    /// Whole-run deadline; 0 disables it
    #[serde(default = "default_workflow_timeout_secs")]
    pub workflow_timeout_secs: u64,
    #[serde(default = "default_transient_retries")]
    pub transient_retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_call_timeout_secs() -> u64 {
    600
}

fn default_workflow_timeout_secs() -> u64 {
    7200
}

fn default_transient_retries() -> u32 {
    2
}

fn default_retry_backoff_ms() -> u64 {
    2000
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            call_timeout_secs: default_call_timeout_secs(),
            workflow_timeout_secs: default_workflow_timeout_secs(),
            transient_retries: default_transient_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchSection {
    /// Ground chapter content in web search results
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_pages_per_chapter")]
    pub pages_per_chapter: usize,
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,
}

fn default_pages_per_chapter() -> usize {
    3
}

fn default_fetch_concurrency() -> usize {
    3
}

fn default_excerpt_chars() -> usize {
    4000
}

impl Default for ResearchSection {
    fn default() -> Self {
        Self {
            enabled: false,
            pages_per_chapter: default_pages_per_chapter(),
            fetch_concurrency: default_fetch_concurrency(),
            excerpt_chars: default_excerpt_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchSection {
    #[serde(default)]
    pub engine: SearchEngine,
    #[serde(default = "default_location")]
    pub location: String,
    #[serde(default = "default_domain")]
    pub domain: String,
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_num_results")]
    pub num_results: u32,
    #[serde(default)]
    pub offset: u32,
    #[serde(default = "default_search_api_key_env")]
    pub api_key_env: String,
}

fn default_location() -> String {
    "Tokyo, Japan".to_string()
}

fn default_domain() -> String {
    "google.com".to_string()
}

fn default_country() -> String {
    "jp".to_string()
}

fn default_language() -> String {
    "ja".to_string()
}

fn default_num_results() -> u32 {
    50
}

fn default_search_api_key_env() -> String {
    "SERPAPI_API_KEY".to_string()
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            engine: SearchEngine::default(),
            location: default_location(),
            domain: default_domain(),
            country: default_country(),
            language: default_language(),
            num_results: default_num_results(),
            offset: 0,
            api_key_env: default_search_api_key_env(),
        }
    }
}

/// Contents of `research.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchToml {
    #[serde(default)]
    pub workflow: WorkflowSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub limits: LimitsSection,
    #[serde(default)]
    pub research: ResearchSection,
    #[serde(default)]
    pub search: SearchSection,
}

impl ResearchToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse research.toml")
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize research.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(WORKSPACE_DIR_ENV).filter(|v| !v.trim().is_empty()) {
            self.workflow.workspace_dir = PathBuf::from(dir);
        }
        if let Some(cmd) = lookup(LLM_CMD_ENV).filter(|v| !v.trim().is_empty()) {
            self.llm.command = cmd;
        }
    }

    pub fn backend(&self) -> Result<LlmBackend> {
        self.llm.backend.parse()
    }

    /// Human-readable problems with the configuration. Empty when valid.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.workflow.max_attempts == 0 {
            warnings.push("workflow.max_attempts = 0 will be raised to 1".to_string());
        }
        if self.workflow.chapter_concurrency == 0 {
            warnings.push("workflow.chapter_concurrency = 0 will be treated as 1".to_string());
        }
        if let Err(e) = self.backend() {
            warnings.push(e.to_string());
        }
        if self.llm.command.trim().is_empty() {
            warnings.push("llm.command is empty".to_string());
        }
        if !(0.0..=2.0).contains(&self.llm.content_temperature) {
            warnings.push(format!(
                "llm.content_temperature {} is outside 0.0..=2.0",
                self.llm.content_temperature
            ));
        }
        if self.research.enabled {
            if self.research.pages_per_chapter == 0 {
                warnings.push(
                    "research.pages_per_chapter = 0: chapters will get no sources".to_string(),
                );
            }
            if self.research.excerpt_chars == 0 {
                warnings.push("research.excerpt_chars = 0: sources will carry no text".to_string());
            }
        }

        warnings
    }
}

/// CLI values that take precedence over file and environment.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub workspace_dir: Option<PathBuf>,
    pub max_attempts: Option<u32>,
    pub chapter_concurrency: Option<usize>,
}

/// Resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub toml: ResearchToml,
    /// File the settings were read from, if any
    pub source: Option<PathBuf>,
}

impl Config {
    /// Load from `path` when given, otherwise from `research.toml` in the
    /// current directory if present, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (mut toml, source) = match path {
            Some(path) => (ResearchToml::load(path)?, Some(path.to_path_buf())),
            None => {
                let default_path = PathBuf::from(CONFIG_FILE_NAME);
                if default_path.exists() {
                    (ResearchToml::load(&default_path)?, Some(default_path))
                } else {
                    (ResearchToml::default(), None)
                }
            }
        };
        toml.apply_env(|key| std::env::var(key).ok());
        Ok(Self { toml, source })
    }

    pub fn with_cli_overrides(mut self, overrides: &CliOverrides) -> Self {
        if let Some(ref dir) = overrides.workspace_dir {
            self.toml.workflow.workspace_dir = dir.clone();
        }
        if let Some(n) = overrides.max_attempts {
            self.toml.workflow.max_attempts = n;
        }
        if let Some(n) = overrides.chapter_concurrency {
            self.toml.workflow.chapter_concurrency = n;
        }
        self
    }

    pub fn workspace_dir(&self) -> &Path {
        &self.toml.workflow.workspace_dir
    }

    pub fn max_attempts(&self) -> u32 {
        self.toml.workflow.max_attempts.max(1)
    }

    pub fn chapter_concurrency(&self) -> usize {
        self.toml.workflow.chapter_concurrency.max(1)
    }

    pub fn batch_cooldown(&self) -> Duration {
        Duration::from_millis(self.toml.workflow.batch_cooldown_ms)
    }

    /// Sampling options for the content writer.
    pub fn content_options(&self) -> GenerateOptions {
        GenerateOptions::default()
            .with_temperature(self.toml.llm.content_temperature)
            .with_frequency_penalty(self.toml.llm.content_frequency_penalty)
    }

    /// Call policy for one run, cancelled through `cancel`.
    pub fn call_policy(&self, cancel: CancellationToken) -> CallPolicy {
        let limits = &self.toml.limits;
        let mut policy = CallPolicy::unbounded()
            .with_retries(
                limits.transient_retries,
                Duration::from_millis(limits.retry_backoff_ms),
            )
            .with_cancellation(cancel);
        if limits.call_timeout_secs > 0 {
            policy = policy.with_call_timeout(Duration::from_secs(limits.call_timeout_secs));
        }
        if limits.workflow_timeout_secs > 0 {
            policy = policy.with_deadline_in(Duration::from_secs(limits.workflow_timeout_secs));
        }
        policy
    }

    /// Locale and paging settings for research searches.
    pub fn search_template(&self) -> SearchRequest {
        let search = &self.toml.search;
        SearchRequest {
            query: String::new(),
            engine: search.engine,
            location: search.location.clone(),
            domain: search.domain.clone(),
            country: search.country.clone(),
            language: search.language.clone(),
            num_results: search.num_results,
            offset: search.offset,
        }
    }

    pub fn llm_api_key(&self) -> Result<String> {
        read_key(&self.toml.llm.api_key_env)
    }

    pub fn search_api_key(&self) -> Result<String> {
        read_key(&self.toml.search.api_key_env)
    }

    /// File validation plus checks against the environment.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = self.toml.validate();
        if matches!(self.toml.backend(), Ok(LlmBackend::OpenAi))
            && let Err(e) = self.llm_api_key()
        {
            warnings.push(e.to_string());
        }
        if self.toml.research.enabled
            && let Err(e) = self.search_api_key()
        {
            warnings.push(e.to_string());
        }
        warnings
    }
}

fn read_key(var: &str) -> Result<String> {
    std::env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .with_context(|| format!("Environment variable {} is not set", var))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_llm_backend_from_str() {
        assert_eq!("command".parse::<LlmBackend>().unwrap(), LlmBackend::Command);
        assert_eq!("OpenAI".parse::<LlmBackend>().unwrap(), LlmBackend::OpenAi);
        let err = "anthropic".parse::<LlmBackend>().unwrap_err();
        assert!(err.to_string().contains("Valid values"));
    }

    #[test]
    fn test_parse_empty_uses_defaults() {
        let toml = ResearchToml::parse("").unwrap();
        assert_eq!(toml.workflow.max_attempts, 3);
        assert_eq!(toml.workflow.chapter_concurrency, 3);
        assert_eq!(toml.workflow.batch_cooldown_ms, 1000);
        assert_eq!(toml.workflow.workspace_dir, PathBuf::from("workspace"));
        assert_eq!(toml.llm.command, "claude");
        assert_eq!(toml.llm.args, vec!["--print"]);
        assert_eq!(toml.limits.call_timeout_secs, 600);
        assert_eq!(toml.limits.transient_retries, 2);
        assert!(!toml.research.enabled);
        assert_eq!(toml.search.location, "Tokyo, Japan");
        assert_eq!(toml.search.api_key_env, "SERPAPI_API_KEY");
        assert!(toml.validate().is_empty());
    }

    #[test]
    fn test_parse_partial_sections() {
        let content = r#"
[workflow]
max_attempts = 5

[llm]
backend = "openai"
model = "gpt-4.1"

[search]
engine = "bing"
"#;
        let toml = ResearchToml::parse(content).unwrap();
        assert_eq!(toml.workflow.max_attempts, 5);
        assert_eq!(toml.workflow.chapter_concurrency, 3);
        assert_eq!(toml.backend().unwrap(), LlmBackend::OpenAi);
        assert_eq!(toml.llm.model, "gpt-4.1");
        assert_eq!(toml.search.engine, SearchEngine::Bing);
    }

    #[test]
    fn test_parse_rejects_unknown_engine() {
        assert!(ResearchToml::parse("[search]\nengine = \"altavista\"").is_err());
    }

    #[test]
    fn test_validate_reports_problems() {
        let content = r#"
[workflow]
max_attempts = 0
chapter_concurrency = 0

[llm]
backend = "carrier-pigeon"

[research]
enabled = true
pages_per_chapter = 0
"#;
        let warnings = ResearchToml::parse(content).unwrap().validate();
        assert!(warnings.iter().any(|w| w.contains("max_attempts")));
        assert!(warnings.iter().any(|w| w.contains("chapter_concurrency")));
        assert!(warnings.iter().any(|w| w.contains("carrier-pigeon")));
        assert!(warnings.iter().any(|w| w.contains("pages_per_chapter")));
    }

    #[test]
    fn test_env_overrides_file() {
        let mut toml = ResearchToml::parse("[workflow]\nworkspace_dir = \"from-file\"").unwrap();
        let env: HashMap<&str, &str> =
            HashMap::from([(WORKSPACE_DIR_ENV, "/tmp/from-env"), (LLM_CMD_ENV, "my-llm")]);

        toml.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(toml.workflow.workspace_dir, PathBuf::from("/tmp/from-env"));
        assert_eq!(toml.llm.command, "my-llm");
    }

    #[test]
    fn test_empty_env_values_are_ignored() {
        let mut toml = ResearchToml::default();
        toml.apply_env(|_| Some("  ".to_string()));
        assert_eq!(toml.workflow.workspace_dir, PathBuf::from("workspace"));
        assert_eq!(toml.llm.command, "claude");
    }

    fn config(toml: ResearchToml) -> Config {
        Config { toml, source: None }
    }

    #[test]
    fn test_cli_overrides_win() {
        let config = config(ResearchToml::default()).with_cli_overrides(&CliOverrides {
            workspace_dir: Some(PathBuf::from("cli-ws")),
            max_attempts: Some(0),
            chapter_concurrency: Some(8),
        });
        assert_eq!(config.workspace_dir(), Path::new("cli-ws"));
        // clamped at use
        assert_eq!(config.max_attempts(), 1);
        assert_eq!(config.chapter_concurrency(), 8);
    }

    #[test]
    fn test_load_and_save_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        let mut toml = ResearchToml::default();
        toml.workflow.max_attempts = 4;
        toml.research.enabled = true;
        toml.save(&path).unwrap();

        let loaded = ResearchToml::load(&path).unwrap();
        assert_eq!(loaded.workflow.max_attempts, 4);
        assert!(loaded.research.enabled);
    }

    #[test]
    fn test_load_missing_explicit_path_is_error() {
        let dir = tempdir().unwrap();
        let err = Config::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_content_options_and_search_template() {
        let mut toml = ResearchToml::default();
        toml.search.country = "us".into();
        toml.search.language = "en".into();
        let config = config(toml);

        let options = config.content_options();
        assert_eq!(options.temperature, Some(0.5));
        assert_eq!(options.frequency_penalty, Some(0.5));

        let template = config.search_template();
        assert!(template.query.is_empty());
        assert_eq!(template.country, "us");
        assert_eq!(template.language, "en");
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_policy_uses_limits() {
        use crate::errors::CapabilityError;
        use std::sync::atomic::{AtomicU32, Ordering};

        let mut toml = ResearchToml::default();
        toml.limits.transient_retries = 5;
        toml.limits.retry_backoff_ms = 10;
        let cancel = CancellationToken::new();
        let policy = config(toml).call_policy(cancel.clone());

        let calls = AtomicU32::new(0);
        let err = policy
            .call("generate", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>(CapabilityError::failed("generate", "down")) }
            })
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::Failed { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 6);

        cancel.cancel();
        let err = policy
            .call("generate", || async { Ok::<_, CapabilityError>(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::Cancelled { .. }));
    }
}

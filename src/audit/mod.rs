//! Diagnostic audit trail for a research run.
//!
//! Intermediate outputs (every trial, its feedback, revision reasons and the
//! accepted result) are appended to named streams. Nothing in the pipeline
//! reads them back; they are a forensic record of how far a run progressed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod sink;
pub use sink::{AuditSink, FileAuditSink, MemoryAuditSink};

/// Stream names used by the workflow.
pub mod streams {
    pub const OUTLINE: &str = "outline.md";
    pub const CHAPTERS: &str = "chapters.json";
    pub const CONTENT: &str = "content.md";
    pub const CONTENT_DRAFT: &str = "final_content_draft.md";
    pub const FINAL_REPORT: &str = "final_report.md";
    pub const COMPLETED_REPORT: &str = "completed_report.md";
    pub const MANIFEST: &str = "run.json";
}

/// Summary of a whole run, written as `run.json` when the run finishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: Uuid,
    pub query: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub phases: Vec<PhaseSummary>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chapters: Vec<ChapterSummary>,
}

impl RunManifest {
    pub fn new(query: &str) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            query: query.to_string(),
            started_at: Utc::now(),
            ended_at: None,
            phases: Vec::new(),
            chapters: Vec::new(),
        }
    }

    pub fn finish(&mut self) {
        self.ended_at = Some(Utc::now());
    }

    /// Phases that were accepted without an explicit proceed.
    pub fn degraded_phases(&self) -> Vec<&PhaseSummary> {
        self.phases
            .iter()
            .filter(|p| p.exhausted || p.forced_acceptance)
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhaseSummary {
    pub phase: String,
    pub attempts: u32,
    pub exhausted: bool,
    pub forced_acceptance: bool,
    pub output_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChapterSummary {
    pub number: i64,
    pub title: String,
    pub attempts: u32,
    pub exhausted: bool,
    pub forced_acceptance: bool,
}

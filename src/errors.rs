//! Typed error hierarchy for the research pipeline.
//!
//! Three top-level enums cover the three layers:
//! - `CapabilityError`: a single generation, search or fetch call
//! - `PhaseError`: one generate/critique/judge phase invocation
//! - `WorkflowError`: the end-to-end outline → report run

use std::time::Duration;
use thiserror::Error;

/// Errors from a single external capability call.
#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("{capability} failed: {message}")]
    Failed { capability: String, message: String },

    #[error("{capability} timed out after {:.1}s", .after.as_secs_f64())]
    Timeout { capability: String, after: Duration },

    #[error("{capability} skipped: workflow deadline exceeded")]
    DeadlineExceeded { capability: String },

    #[error("{capability} cancelled")]
    Cancelled { capability: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CapabilityError {
    pub fn failed(capability: &str, message: impl Into<String>) -> Self {
        Self::Failed {
            capability: capability.to_string(),
            message: message.into(),
        }
    }

    /// Whether another attempt of the same call could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::Timeout { .. } | Self::Other(_))
    }
}

/// Errors from a single phase invocation.
#[derive(Debug, Error)]
pub enum PhaseError {
    #[error("Phase {phase}: producer failed on attempt {attempt}: {source}")]
    Producer {
        phase: String,
        attempt: u32,
        #[source]
        source: CapabilityError,
    },

    #[error("Phase {phase}: reviewer failed on attempt {attempt}: {source}")]
    Reviewer {
        phase: String,
        attempt: u32,
        #[source]
        source: CapabilityError,
    },

    #[error("Phase {phase}: referee failed on attempt {attempt}: {source}")]
    Referee {
        phase: String,
        attempt: u32,
        #[source]
        source: CapabilityError,
    },
}

impl PhaseError {
    pub fn attempt(&self) -> u32 {
        match self {
            Self::Producer { attempt, .. }
            | Self::Reviewer { attempt, .. }
            | Self::Referee { attempt, .. } => *attempt,
        }
    }
}

/// Errors from the end-to-end workflow.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("Outline phase failed: {0}")]
    Outline(#[source] PhaseError),

    #[error("Chapter parser call failed: {0}")]
    ChapterParser(#[source] CapabilityError),

    #[error("Failed to parse chapter list: {source}")]
    ChapterParse {
        raw: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Outline produced no chapters")]
    NoChapters,

    #[error("Chapter {number} failed: {source}")]
    Chapter {
        number: i64,
        #[source]
        source: PhaseError,
    },

    #[error("Final report phase failed: {0}")]
    FinalReport(#[source] PhaseError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_error_failed_is_transient() {
        let err = CapabilityError::failed("generate", "503 from upstream");
        assert!(err.is_transient());
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn capability_error_cancelled_is_not_transient() {
        let err = CapabilityError::Cancelled {
            capability: "generate".into(),
        };
        assert!(!err.is_transient());
        let err = CapabilityError::DeadlineExceeded {
            capability: "search".into(),
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn capability_error_timeout_carries_duration() {
        let err = CapabilityError::Timeout {
            capability: "fetch".into(),
            after: Duration::from_secs(30),
        };
        assert!(err.to_string().contains("30"));
    }

    #[test]
    fn phase_error_carries_attempt() {
        let err = PhaseError::Referee {
            phase: "outline".into(),
            attempt: 2,
            source: CapabilityError::failed("judge", "boom"),
        };
        assert_eq!(err.attempt(), 2);
        assert!(err.to_string().contains("outline"));
    }

    #[test]
    fn workflow_error_chapter_carries_number() {
        let err = WorkflowError::Chapter {
            number: 4,
            source: PhaseError::Producer {
                phase: "content".into(),
                attempt: 1,
                source: CapabilityError::failed("generate", "x"),
            },
        };
        match &err {
            WorkflowError::Chapter { number, source } => {
                assert_eq!(*number, 4);
                assert_eq!(source.attempt(), 1);
            }
            _ => panic!("Expected Chapter variant"),
        }
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&CapabilityError::failed("x", "y"));
        assert_std_error(&WorkflowError::NoChapters);
    }
}

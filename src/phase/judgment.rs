//! Referee verdicts and their parsing.

use crate::util::parse_fenced_json;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What the referee decided about one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Judgment {
    Proceed,
    Revise,
}

impl fmt::Display for Judgment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Judgment::Proceed => write!(f, "proceed"),
            Judgment::Revise => write!(f, "revise"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct JudgmentPayload {
    action: Judgment,
    #[serde(default)]
    reason: Option<String>,
}

/// Outcome of parsing a referee reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedJudgment {
    Valid {
        action: Judgment,
        reason: Option<String>,
    },
    /// The reply did not contain a well-formed verdict.
    ParseFailure { raw: String },
}

impl ParsedJudgment {
    pub fn proceed(reason: Option<&str>) -> Self {
        Self::Valid {
            action: Judgment::Proceed,
            reason: reason.map(str::to_string),
        }
    }

    pub fn revise(reason: Option<&str>) -> Self {
        Self::Valid {
            action: Judgment::Revise,
            reason: reason.map(str::to_string),
        }
    }
}

/// Parse a raw referee reply.
///
/// The payload is the first fenced code block, or the whole trimmed reply
/// when there is none. It must be a JSON object with an `action` of
/// `"proceed"` or `"revise"` and an optional string `reason`.
pub fn parse_judgment(raw: &str) -> ParsedJudgment {
    match parse_fenced_json::<JudgmentPayload>(raw) {
        Ok(payload) => ParsedJudgment::Valid {
            action: payload.action,
            reason: payload.reason.filter(|r| !r.trim().is_empty()),
        },
        Err(_) => ParsedJudgment::ParseFailure {
            raw: raw.to_string(),
        },
    }
}

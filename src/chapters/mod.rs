//! Chapters of a report outline and their developed content.

use crate::audit::ChapterSummary;
use crate::phase::PhaseResult;
use crate::util::parse_fenced_json;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

pub mod pipeline;

pub use pipeline::ChapterPipeline;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    #[serde(deserialize_with = "whole_number")]
    pub number: i64,
    pub title: String,
    #[serde(default)]
    pub description: String,
}

impl Chapter {
    pub fn label(&self) -> String {
        format!("Chapter {}", self.number)
    }
}

/// Largest integer an `f64` holds exactly.
const MAX_EXACT_FLOAT: f64 = 9_007_199_254_740_992.0;

/// Accepts any JSON integer and floats without a fractional part (`2.0`).
fn whole_number<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let number = serde_json::Number::deserialize(deserializer)?;
    if let Some(n) = number.as_i64() {
        return Ok(n);
    }
    match number.as_f64() {
        Some(f) if f.fract() == 0.0 && f.abs() <= MAX_EXACT_FLOAT => Ok(f as i64),
        _ => Err(D::Error::custom(format!(
            "chapter number must be a whole number, got {number}"
        ))),
    }
}

/// Chapter-parser wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterList {
    pub chapters: Vec<Chapter>,
}

/// Parse the chapter-parser agent's reply.
pub fn parse_chapters(raw: &str) -> Result<Vec<Chapter>, serde_json::Error> {
    parse_fenced_json::<ChapterList>(raw).map(|list| list.chapters)
}

/// Numbers that occur more than once, ascending.
pub fn duplicate_numbers(chapters: &[Chapter]) -> Vec<i64> {
    let mut numbers: Vec<i64> = chapters.iter().map(|c| c.number).collect();
    numbers.sort_unstable();
    let mut dups: Vec<i64> = numbers
        .windows(2)
        .filter(|w| w[0] == w[1])
        .map(|w| w[0])
        .collect();
    dups.dedup();
    dups
}

/// A chapter together with the accepted output of its content phase.
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterContent {
    pub chapter: Chapter,
    pub result: PhaseResult,
}

impl ChapterContent {
    pub fn text(&self) -> &str {
        &self.result.text
    }

    pub fn summary(&self) -> ChapterSummary {
        ChapterSummary {
            number: self.chapter.number,
            title: self.chapter.title.clone(),
            attempts: self.result.attempts,
            exhausted: self.result.exhausted,
            forced_acceptance: self.result.forced_acceptance,
        }
    }
}

/// Sort by chapter number, keeping the input order of equal numbers.
pub fn sort_by_number(contents: &mut [ChapterContent]) {
    contents.sort_by_key(|c| c.chapter.number);
}

/// Concatenate chapter texts in their current order.
pub fn join_contents(contents: &[ChapterContent]) -> String {
    contents
        .iter()
        .map(ChapterContent::text)
        .collect::<Vec<_>>()
        .join("\n\n")
}

//! deep-research: an LLM-driven research report pipeline.
//!
//! A query is turned into an outline, each outline chapter is developed into
//! researched content, and the chapters are assembled into a final report.
//! Every phase runs the same generate → critique → judge → revise loop
//! ([`phase::PhaseController`]).

pub mod audit;
pub mod batch;
pub mod chapters;
pub mod config;
pub mod errors;
pub mod llm;
pub mod orchestrator;
pub mod phase;
pub mod policy;
pub mod prompts;
pub mod research;
pub mod tools;
pub mod util;

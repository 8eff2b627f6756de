//! Phases of the research pipeline and the roles that drive them.
//!
//! A [`Phase`] bundles three capabilities:
//!
//! | Role       | Trait        | Produces                                  |
//! |------------|--------------|-------------------------------------------|
//! | producer   | [`Producer`] | a draft for the current input              |
//! | reviewer   | [`Reviewer`] | free-text critique of a draft              |
//! | referee    | [`Referee`]  | raw verdict text, parsed by [`judgment`]   |
//!
//! [`controller::PhaseController`] runs the generate/critique/judge loop over
//! a phase.

use crate::audit::AuditSink;
use crate::errors::CapabilityError;
use crate::llm::Agent;
use crate::policy::CallPolicy;
use crate::prompts;
use async_trait::async_trait;
use std::sync::Arc;

pub mod controller;
pub mod judgment;

pub use controller::{PhaseController, PhaseResult, WorkUnit};
pub use judgment::{Judgment, ParsedJudgment, parse_judgment};

#[async_trait]
pub trait Producer: Send + Sync {
    /// Turn the controller's input into the prompt passed to [`produce`].
    ///
    /// Called once per attempt, outside the run's [`CallPolicy`]. Producers
    /// that call tools here apply their own limits to those calls.
    ///
    /// [`produce`]: Producer::produce
    async fn prepare(&self, _subject: &str, input: &str) -> Result<String, CapabilityError> {
        Ok(input.to_string())
    }

    /// Generate output for `prompt`. `subject` names the unit of work
    /// (a query, a chapter title).
    async fn produce(&self, subject: &str, prompt: &str) -> Result<String, CapabilityError>;
}

#[async_trait]
pub trait Reviewer: Send + Sync {
    async fn review(&self, subject: &str, output: &str) -> Result<String, CapabilityError>;
}

#[async_trait]
pub trait Referee: Send + Sync {
    /// Return the raw verdict on `output` given the reviewer's `feedback`.
    async fn judge(&self, phase: &str, output: &str, feedback: &str)
    -> Result<String, CapabilityError>;
}

/// A named generate/critique/judge triple.
#[derive(Clone)]
pub struct Phase {
    name: String,
    producer: Arc<dyn Producer>,
    reviewer: Arc<dyn Reviewer>,
    referee: Arc<dyn Referee>,
}

impl std::fmt::Debug for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Phase")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Phase {
    pub fn new(
        name: &str,
        producer: Arc<dyn Producer>,
        reviewer: Arc<dyn Reviewer>,
        referee: Arc<dyn Referee>,
    ) -> Self {
        Self {
            name: name.to_string(),
            producer,
            reviewer,
            referee,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn producer(&self) -> &Arc<dyn Producer> {
        &self.producer
    }

    pub fn reviewer(&self) -> &Arc<dyn Reviewer> {
        &self.reviewer
    }

    pub fn referee(&self) -> &Arc<dyn Referee> {
        &self.referee
    }
}

/// Per-run services threaded through every controller.
#[derive(Clone)]
pub struct RunContext {
    pub audit: Arc<dyn AuditSink>,
    pub policy: CallPolicy,
}

impl RunContext {
    pub fn new(audit: Arc<dyn AuditSink>, policy: CallPolicy) -> Self {
        Self { audit, policy }
    }
}

#[async_trait]
impl Producer for Agent {
    async fn produce(&self, _subject: &str, prompt: &str) -> Result<String, CapabilityError> {
        self.generate(prompt).await
    }
}

/// Reviewer that asks an agent to critique, with a phase-specific prompt.
pub struct ReflectionReviewer {
    agent: Agent,
    prompt: fn(&str, &str) -> String,
}

impl ReflectionReviewer {
    /// `prompt` receives `(subject, output)`.
    pub fn new(agent: Agent, prompt: fn(&str, &str) -> String) -> Self {
        Self { agent, prompt }
    }
}

#[async_trait]
impl Reviewer for ReflectionReviewer {
    async fn review(&self, subject: &str, output: &str) -> Result<String, CapabilityError> {
        self.agent.generate(&(self.prompt)(subject, output)).await
    }
}

/// Referee backed by the phase-judge agent.
pub struct JudgeReferee {
    agent: Agent,
}

impl JudgeReferee {
    pub fn new(agent: Agent) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl Referee for JudgeReferee {
    async fn judge(
        &self,
        phase: &str,
        output: &str,
        feedback: &str,
    ) -> Result<String, CapabilityError> {
        self.agent
            .generate(&prompts::phase_judge_prompt(phase, output, feedback))
            .await
    }
}

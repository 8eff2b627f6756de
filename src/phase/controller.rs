//! The generate → critique → judge → revise loop.
//!
//! Each attempt runs through explicit [`ControllerState`]s. The only decision
//! point is [`next_step`], a pure function of the attempt index, the budget and
//! the parsed verdict:
//!
//! - `proceed` accepts the current output;
//! - an unparseable verdict accepts it too, flagged `forced_acceptance`;
//! - `revise` on the last allowed attempt accepts it, flagged `exhausted`;
//! - `revise` otherwise regenerates from the prior output plus the critique.

use super::judgment::{Judgment, ParsedJudgment, parse_judgment};
use super::{Phase, RunContext};
use crate::audit::PhaseSummary;
use crate::errors::{CapabilityError, PhaseError};
use crate::prompts::build_revision_prompt;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Outcome of one phase invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseResult {
    /// Most recent producer output.
    pub text: String,
    pub attempts: u32,
    /// The budget ran out while the referee still asked for a revision.
    pub exhausted: bool,
    /// The referee's reply could not be parsed and the output was accepted anyway.
    pub forced_acceptance: bool,
    pub judgment: Judgment,
    pub reason: Option<String>,
}

impl PhaseResult {
    pub fn summary(&self, phase: &str) -> PhaseSummary {
        PhaseSummary {
            phase: phase.to_string(),
            attempts: self.attempts,
            exhausted: self.exhausted,
            forced_acceptance: self.forced_acceptance,
            output_chars: self.text.chars().count(),
        }
    }
}

/// The unit a phase invocation works on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkUnit {
    /// Handed to producer and reviewer (a query, a chapter title).
    pub subject: String,
    /// Prefix for audit headings, e.g. `Chapter 3`.
    pub label: Option<String>,
}

impl WorkUnit {
    pub fn new(subject: &str) -> Self {
        Self {
            subject: subject.to_string(),
            label: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ControllerState {
    Generating {
        attempt: u32,
        input: String,
    },
    Critiquing {
        attempt: u32,
        output: String,
    },
    Judging {
        attempt: u32,
        output: String,
        feedback: String,
    },
    Revising {
        attempt: u32,
        output: String,
        feedback: String,
        reason: Option<String>,
    },
    Accepted(PhaseResult),
}

/// Decision taken after a verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    Accept {
        judgment: Judgment,
        reason: Option<String>,
        exhausted: bool,
        forced_acceptance: bool,
    },
    Revise {
        reason: Option<String>,
    },
}

pub fn next_step(attempt: u32, max_attempts: u32, judgment: &ParsedJudgment) -> Transition {
    match judgment {
        ParsedJudgment::ParseFailure { .. } => Transition::Accept {
            judgment: Judgment::Proceed,
            reason: None,
            exhausted: false,
            forced_acceptance: true,
        },
        ParsedJudgment::Valid {
            action: Judgment::Proceed,
            reason,
        } => Transition::Accept {
            judgment: Judgment::Proceed,
            reason: reason.clone(),
            exhausted: false,
            forced_acceptance: false,
        },
        ParsedJudgment::Valid {
            action: Judgment::Revise,
            reason,
        } if attempt >= max_attempts => Transition::Accept {
            judgment: Judgment::Revise,
            reason: reason.clone(),
            exhausted: true,
            forced_acceptance: false,
        },
        ParsedJudgment::Valid {
            action: Judgment::Revise,
            reason,
        } => Transition::Revise {
            reason: reason.clone(),
        },
    }
}

/// Runs a [`Phase`] under a retry budget.
#[derive(Clone)]
pub struct PhaseController {
    phase: Phase,
    ctx: RunContext,
    stream: String,
    max_attempts: u32,
}

impl PhaseController {
    /// `stream` is the audit stream the phase's trials are appended to.
    pub fn new(phase: Phase, ctx: RunContext, stream: &str) -> Self {
        Self {
            phase,
            ctx,
            stream: stream.to_string(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Values below 1 are raised to 1.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub async fn run(&self, input: &str) -> Result<PhaseResult, PhaseError> {
        self.run_unit(&WorkUnit::new(self.phase.name()), input).await
    }

    pub async fn run_unit(&self, unit: &WorkUnit, input: &str) -> Result<PhaseResult, PhaseError> {
        let phase = self.phase.name();
        tracing::info!(phase, unit = unit.label.as_deref().unwrap_or(""), "phase started");

        let mut state = ControllerState::Generating {
            attempt: 1,
            input: input.to_string(),
        };

        loop {
            state = match state {
                ControllerState::Generating { attempt, input } => {
                    tracing::debug!(phase, attempt, "generating");
                    let producer = self.phase.producer();
                    let producer_error = |source: CapabilityError| PhaseError::Producer {
                        phase: phase.to_string(),
                        attempt,
                        source,
                    };
                    let prompt = producer
                        .prepare(&unit.subject, &input)
                        .await
                        .map_err(producer_error)?;
                    let output = self
                        .ctx
                        .policy
                        .call(&format!("{phase}/produce"), || {
                            producer.produce(&unit.subject, &prompt)
                        })
                        .await
                        .map_err(producer_error)?;
                    self.audit(unit, &format!("trial {attempt}"), &output).await;
                    ControllerState::Critiquing { attempt, output }
                }
                ControllerState::Critiquing { attempt, output } => {
                    tracing::debug!(phase, attempt, "critiquing");
                    let reviewer = self.phase.reviewer();
                    let feedback = self
                        .ctx
                        .policy
                        .call(&format!("{phase}/review"), || {
                            reviewer.review(&unit.subject, &output)
                        })
                        .await
                        .map_err(|source| PhaseError::Reviewer {
                            phase: phase.to_string(),
                            attempt,
                            source,
                        })?;
                    self.audit(unit, &format!("feedback {attempt}"), &feedback).await;
                    ControllerState::Judging {
                        attempt,
                        output,
                        feedback,
                    }
                }
                ControllerState::Judging {
                    attempt,
                    output,
                    feedback,
                } => {
                    tracing::debug!(phase, attempt, "judging");
                    let referee = self.phase.referee();
                    let raw = self
                        .ctx
                        .policy
                        .call(&format!("{phase}/judge"), || {
                            referee.judge(phase, &output, &feedback)
                        })
                        .await
                        .map_err(|source| PhaseError::Referee {
                            phase: phase.to_string(),
                            attempt,
                            source,
                        })?;
                    let parsed = parse_judgment(&raw);
                    if let ParsedJudgment::ParseFailure { raw } = &parsed {
                        tracing::warn!(
                            phase,
                            attempt,
                            raw = %raw,
                            "unparseable judgment, accepting current output"
                        );
                    }

                    match next_step(attempt, self.max_attempts, &parsed) {
                        Transition::Accept {
                            judgment,
                            reason,
                            exhausted,
                            forced_acceptance,
                        } => {
                            if exhausted {
                                tracing::warn!(
                                    phase,
                                    attempts = attempt,
                                    reason = reason.as_deref().unwrap_or(""),
                                    "attempt budget exhausted, accepting last output"
                                );
                            }
                            ControllerState::Accepted(PhaseResult {
                                text: output,
                                attempts: attempt,
                                exhausted,
                                forced_acceptance,
                                judgment,
                                reason,
                            })
                        }
                        Transition::Revise { reason } => ControllerState::Revising {
                            attempt,
                            output,
                            feedback,
                            reason,
                        },
                    }
                }
                ControllerState::Revising {
                    attempt,
                    output,
                    feedback,
                    reason,
                } => {
                    tracing::debug!(phase, attempt, reason = reason.as_deref().unwrap_or(""), "revising");
                    self.audit(
                        unit,
                        &format!("revision reason {attempt}"),
                        reason.as_deref().unwrap_or(""),
                    )
                    .await;
                    ControllerState::Generating {
                        attempt: attempt + 1,
                        input: build_revision_prompt(&output, &feedback),
                    }
                }
                ControllerState::Accepted(result) => {
                    self.audit(unit, "final", &result.text).await;
                    tracing::info!(
                        phase,
                        unit = unit.label.as_deref().unwrap_or(""),
                        attempts = result.attempts,
                        exhausted = result.exhausted,
                        forced_acceptance = result.forced_acceptance,
                        "phase accepted"
                    );
                    return Ok(result);
                }
            };
        }
    }

    async fn audit(&self, unit: &WorkUnit, heading: &str, body: &str) {
        let heading = match &unit.label {
            Some(label) => format!("==== {label} {heading} ===="),
            None => format!("==== {heading} ===="),
        };
        let entry = format!("{heading}\n\n{body}\n\n");
        if let Err(e) = self.ctx.audit.append(&self.stream, &entry).await {
            tracing::warn!(
                phase = self.phase.name(),
                stream = %self.stream,
                error = %e,
                "failed to write audit entry"
            );
        }
    }
}

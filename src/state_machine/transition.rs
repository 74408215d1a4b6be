//! Pure phase transition function
//!
//! Sequencing per invocation is strictly
//! append → start → (poll ↔ tool dispatch)* → drain → settle.

use super::state::project_history;
use super::{Effect, Event, RunContext, RunPhase, StallReason};
use crate::assistants::{Run, RunStatus};
use std::time::Duration;
use thiserror::Error;

/// Result of a phase transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_phase: RunPhase,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(phase: RunPhase) -> Self {
        Self {
            new_phase: phase,
            effects: vec![],
        }
    }

    #[must_use]
    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("A run is already in flight")]
    RunInFlight,
    #[error("Message text is empty")]
    EmptyMessage,
    #[error("Observed run {observed} while driving {expected}")]
    UnexpectedRun { expected: String, observed: String },
    #[error("Submitted {submitted} tool outputs for {pending} pending calls")]
    IncompleteToolOutputs { pending: usize, submitted: usize },
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function
///
/// Given the same inputs it always produces the same outputs, with no I/O.
pub fn transition(
    phase: &RunPhase,
    context: &RunContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (phase, event) {
        // ============================================================
        // Send
        // ============================================================
        (_, Event::Send { .. }) if phase.is_active() => Err(TransitionError::RunInFlight),

        (_, Event::Send { text }) => {
            if text.trim().is_empty() {
                return Err(TransitionError::EmptyMessage);
            }
            Ok(TransitionResult::new(RunPhase::Appending)
                .with_effect(Effect::status("Adding message to thread..."))
                .with_effect(Effect::AppendMessage { text }))
        }

        (RunPhase::Appending, Event::MessageAppended) => {
            Ok(TransitionResult::new(RunPhase::Starting)
                .with_effect(Effect::status("Starting run..."))
                .with_effect(Effect::CreateRun))
        }

        // First fetch happens immediately after the run is created
        (RunPhase::Starting, Event::RunCreated { run_id }) => Ok(TransitionResult::new(
            RunPhase::Polling {
                run_id: run_id.clone(),
                polls: 0,
            },
        )
        .with_effect(Effect::status("Waiting for response..."))
        .with_effect(Effect::FetchRun {
            run_id,
            delay: Duration::ZERO,
        })),

        // ============================================================
        // Poll loop
        // ============================================================
        (RunPhase::Polling { run_id, polls }, Event::RunObserved { run }) => {
            if run.id != *run_id {
                return Err(TransitionError::UnexpectedRun {
                    expected: run_id.clone(),
                    observed: run.id,
                });
            }
            Ok(observe(run_id, polls + 1, &run, context))
        }

        (
            RunPhase::SubmittingOutputs {
                run_id,
                polls,
                pending_ids,
            },
            Event::ToolOutputsSubmitted {
                run_id: submitted_for,
                count,
            },
        ) => {
            if submitted_for != *run_id {
                return Err(TransitionError::UnexpectedRun {
                    expected: run_id.clone(),
                    observed: submitted_for,
                });
            }
            if count != pending_ids.len() {
                return Err(TransitionError::IncompleteToolOutputs {
                    pending: pending_ids.len(),
                    submitted: count,
                });
            }
            Ok(keep_polling(run_id, *polls, context))
        }

        // ============================================================
        // Drain
        // ============================================================
        (RunPhase::Draining { .. }, Event::MessagesFetched { messages }) => {
            Ok(TransitionResult::new(RunPhase::Completed)
                .with_effect(Effect::ReplaceHistory {
                    messages: project_history(&messages),
                })
                .with_effect(Effect::status("Response received!")))
        }

        // ============================================================
        // Cancellation and timeout
        // ============================================================
        (_, Event::Cancel) if phase.is_active() => Ok(TransitionResult::new(RunPhase::Cancelled)
            .with_effect(Effect::status("Run cancelled"))),

        // Nothing to cancel
        (_, Event::Cancel) => Ok(TransitionResult::new(phase.clone())),

        (_, Event::TimedOut { elapsed }) if phase.is_active() => {
            Ok(stall(StallReason::Timeout { elapsed }))
        }

        (_, event) => Err(TransitionError::InvalidTransition(format!(
            "{} while {phase:?}",
            event.name()
        ))),
    }
}

/// Handle one run observation; `polls` already counts it
fn observe(run_id: &str, polls: u32, run: &Run, context: &RunContext) -> TransitionResult {
    if run.status == RunStatus::Completed {
        return TransitionResult::new(RunPhase::Draining {
            run_id: run_id.to_string(),
        })
        .with_effect(Effect::FetchMessages);
    }

    if let Some(calls) = run.pending_tool_calls() {
        return TransitionResult::new(RunPhase::SubmittingOutputs {
            run_id: run_id.to_string(),
            polls,
            pending_ids: calls.iter().map(|c| c.id.clone()).collect(),
        })
        .with_effect(Effect::status("Got action request..."))
        .with_effect(Effect::DispatchTools {
            run_id: run_id.to_string(),
            calls: calls.to_vec(),
        });
    }

    if run.status.is_terminal_failure() {
        return stall(StallReason::Terminal { status: run.status });
    }

    keep_polling(run_id, polls, context)
}

/// Schedule the next poll tick unless the poll budget is spent
fn keep_polling(run_id: &str, polls: u32, context: &RunContext) -> TransitionResult {
    if context.max_polls.is_some_and(|max| polls >= max) {
        return stall(StallReason::PollLimit { polls });
    }

    TransitionResult::new(RunPhase::Polling {
        run_id: run_id.to_string(),
        polls,
    })
    .with_effect(Effect::FetchRun {
        run_id: run_id.to_string(),
        delay: context.poll_interval,
    })
}

fn stall(reason: StallReason) -> TransitionResult {
    let status = format!("Run stalled: {reason}");
    TransitionResult::new(RunPhase::Stalled { reason }).with_effect(Effect::status(status))
}

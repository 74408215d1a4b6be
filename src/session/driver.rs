//! Run driver: executes state machine effects against the service
//!
//! Every suspension point (service call or poll sleep) is raced against the
//! cancellation token and the run deadline. Whichever fires first is fed
//! back to the state machine as an event.

use super::{RunOutcome, Session, SessionError};
use crate::actions::{ActionRegistry, DisplaySurface};
use crate::assistants::{AssistantService, CreateRun};
use crate::state_machine::{transition, Effect, Event, RunContext, RunPhase, TransitionError};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

pub(crate) struct RunDriver<'a> {
    pub(crate) session: &'a Session,
    pub(crate) service: Arc<dyn AssistantService>,
    pub(crate) context: RunContext,
    pub(crate) registry: &'a ActionRegistry,
    pub(crate) display: &'a dyn DisplaySurface,
    pub(crate) cancel: CancellationToken,
    pub(crate) run_timeout: Option<Duration>,
}

impl RunDriver<'_> {
    /// Drive one message through append, run, poll and drain
    pub(crate) async fn drive(self, text: String) -> Result<RunOutcome, SessionError> {
        let started = Instant::now();
        let deadline = self.run_timeout.map(|timeout| started + timeout);

        let mut phase = RunPhase::Idle;
        let mut pending = VecDeque::from([Event::Send { text }]);

        while let Some(event) = pending.pop_front() {
            let event_name = event.name();
            let result = transition(&phase, &self.context, event)?;

            if result.new_phase != phase {
                tracing::debug!(
                    thread_id = %self.context.thread_id,
                    run_id = ?result.new_phase.run_id().or(phase.run_id()),
                    event = event_name,
                    from = ?phase,
                    to = ?result.new_phase,
                    "Run phase transition"
                );
            }
            phase = result.new_phase;

            for effect in result.effects {
                if let Some(next) = self.execute(effect, started, deadline).await? {
                    pending.push_back(next);
                }
            }
        }

        match phase {
            RunPhase::Completed => Ok(RunOutcome::Completed),
            RunPhase::Stalled { reason } => {
                tracing::warn!(thread_id = %self.context.thread_id, %reason, "Run stalled");
                Ok(RunOutcome::Stalled { reason })
            }
            RunPhase::Cancelled => {
                tracing::info!(thread_id = %self.context.thread_id, "Run cancelled");
                Ok(RunOutcome::Cancelled)
            }
            other => Err(TransitionError::InvalidTransition(format!(
                "run stopped without settling in {other:?}"
            ))
            .into()),
        }
    }

    async fn execute(
        &self,
        effect: Effect,
        started: Instant,
        deadline: Option<Instant>,
    ) -> Result<Option<Event>, SessionError> {
        let thread_id = self.context.thread_id.as_str();

        let event = match effect {
            Effect::PushStatus(status) => {
                self.session.push_status(status);
                return Ok(None);
            }

            Effect::ReplaceHistory { messages } => {
                self.session.replace_history(messages);
                return Ok(None);
            }

            Effect::AppendMessage { text } => {
                match self
                    .interruptible(self.service.create_message(thread_id, &text), started, deadline)
                    .await
                {
                    Ok(result) => {
                        result?;
                        Event::MessageAppended
                    }
                    Err(interrupt) => interrupt,
                }
            }

            Effect::CreateRun => {
                let params = CreateRun {
                    assistant_id: self.context.assistant_id.clone(),
                    instructions: self.context.instructions.clone(),
                };
                match self
                    .interruptible(self.service.create_run(thread_id, &params), started, deadline)
                    .await
                {
                    Ok(result) => Event::RunCreated { run_id: result?.id },
                    Err(interrupt) => interrupt,
                }
            }

            Effect::FetchRun { run_id, delay } => {
                let fetch = async {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    self.service.get_run(thread_id, &run_id).await
                };
                match self.interruptible(fetch, started, deadline).await {
                    Ok(result) => Event::RunObserved { run: result? },
                    Err(interrupt) => interrupt,
                }
            }

            Effect::DispatchTools { run_id, calls } => {
                let report = self.registry.dispatch_batch(&calls, self.display);
                for status in report.statuses {
                    self.session.push_status(status);
                }
                let count = report.outputs.len();
                match self
                    .interruptible(
                        self.service
                            .submit_tool_outputs(thread_id, &run_id, &report.outputs),
                        started,
                        deadline,
                    )
                    .await
                {
                    Ok(result) => {
                        result?;
                        Event::ToolOutputsSubmitted { run_id, count }
                    }
                    Err(interrupt) => interrupt,
                }
            }

            Effect::FetchMessages => {
                match self
                    .interruptible(self.service.list_messages(thread_id), started, deadline)
                    .await
                {
                    Ok(result) => Event::MessagesFetched { messages: result? },
                    Err(interrupt) => interrupt,
                }
            }
        };

        Ok(Some(event))
    }

    /// Race `work` against cancellation and the deadline.
    ///
    /// Cancellation wins ties so an already-cancelled token never starts work.
    async fn interruptible<T>(
        &self,
        work: impl Future<Output = T>,
        started: Instant,
        deadline: Option<Instant>,
    ) -> Result<T, Event> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(Event::Cancel),
            () = sleep_until(deadline) => Err(Event::TimedOut { elapsed: started.elapsed() }),
            value = work => Ok(value),
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

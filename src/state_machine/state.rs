//! Run lifecycle state types

use crate::assistants::{MessageRole, RunStatus, ThreadMessage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Text shown for messages whose first content block is not plain text
pub const UNSUPPORTED_CONTENT: &str = "unsupported content";

// ============================================================================
// History
// ============================================================================

/// Who wrote a history entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Owner {
    Assistant,
    User,
}

impl From<MessageRole> for Owner {
    fn from(role: MessageRole) -> Self {
        match role {
            MessageRole::Assistant => Owner::Assistant,
            MessageRole::User => Owner::User,
        }
    }
}

/// Local projection of a thread message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub owner: Owner,
    pub text: String,
}

impl Message {
    pub fn new(owner: Owner, text: impl Into<String>) -> Self {
        Self {
            owner,
            text: text.into(),
        }
    }
}

impl From<&ThreadMessage> for Message {
    fn from(remote: &ThreadMessage) -> Self {
        Message {
            owner: remote.role.into(),
            text: remote
                .first_text()
                .unwrap_or(UNSUPPORTED_CONTENT)
                .to_string(),
        }
    }
}

/// Map a full remote listing to local history, preserving order
pub fn project_history(remote: &[ThreadMessage]) -> Vec<Message> {
    remote.iter().map(Message::from).collect()
}

// ============================================================================
// Run Phase
// ============================================================================

/// Why a run stopped without completing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StallReason {
    /// The poll budget ran out while the run was still pending
    PollLimit { polls: u32 },
    /// The wall-clock bound elapsed
    Timeout { elapsed: Duration },
    /// The service ended the run with a non-success status
    Terminal { status: RunStatus },
}

impl fmt::Display for StallReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StallReason::PollLimit { polls } => {
                write!(f, "still pending after {polls} polls")
            }
            StallReason::Timeout { elapsed } => {
                write!(f, "no completion after {}s", elapsed.as_secs())
            }
            StallReason::Terminal { status } => write!(f, "run ended as {status}"),
        }
    }
}

/// Where a single `send_message` invocation is in its lifecycle
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RunPhase {
    /// Nothing started yet
    #[default]
    Idle,

    /// User message being posted to the thread
    Appending,

    /// Run being created
    Starting,

    /// Waiting on the run; `polls` counts observations so far
    Polling { run_id: String, polls: u32 },

    /// Tool outputs for one `requires_action` batch being computed and submitted
    SubmittingOutputs {
        run_id: String,
        polls: u32,
        pending_ids: Vec<String>,
    },

    /// Run completed, history being fetched
    Draining { run_id: String },

    /// History replaced with the service's list
    Completed,

    /// Gave up on the run
    Stalled { reason: StallReason },

    /// Aborted through the cancellation token
    Cancelled,
}

impl RunPhase {
    /// No further events are expected
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunPhase::Completed | RunPhase::Stalled { .. } | RunPhase::Cancelled
        )
    }

    /// A run is being driven
    pub fn is_active(&self) -> bool {
        !matches!(self, RunPhase::Idle) && !self.is_terminal()
    }

    pub fn run_id(&self) -> Option<&str> {
        match self {
            RunPhase::Polling { run_id, .. }
            | RunPhase::SubmittingOutputs { run_id, .. }
            | RunPhase::Draining { run_id } => Some(run_id),
            _ => None,
        }
    }
}

// ============================================================================
// Run Context
// ============================================================================

/// Immutable parameters of one run
#[derive(Debug, Clone)]
pub struct RunContext {
    pub thread_id: String,
    pub assistant_id: String,
    pub instructions: String,
    pub poll_interval: Duration,
    /// `None` polls until the run settles
    pub max_polls: Option<u32>,
}

impl RunContext {
    pub fn new(
        thread_id: impl Into<String>,
        assistant_id: impl Into<String>,
        poll_interval: Duration,
        max_polls: Option<u32>,
    ) -> Self {
        Self {
            thread_id: thread_id.into(),
            assistant_id: assistant_id.into(),
            instructions: String::new(),
            poll_interval,
            max_polls,
        }
    }
}

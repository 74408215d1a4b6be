//! Effects produced by phase transitions

use super::state::Message;
use crate::assistants::ToolCallRequest;
use std::time::Duration;

/// Effects to be executed after a transition, in order
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Append an entry to the status log
    PushStatus(String),

    /// Post the user message to the thread
    AppendMessage { text: String },

    /// Start a run bound to the configured assistant
    CreateRun,

    /// Wait `delay`, then fetch the run
    FetchRun { run_id: String, delay: Duration },

    /// Answer the whole batch and submit it in one call
    DispatchTools {
        run_id: String,
        calls: Vec<ToolCallRequest>,
    },

    /// Fetch the thread's full message list
    FetchMessages,

    /// Replace local history wholesale
    ReplaceHistory { messages: Vec<Message> },
}

impl Effect {
    pub fn status(text: impl Into<String>) -> Self {
        Effect::PushStatus(text.into())
    }

    /// Whether executing this effect yields a follow-up event
    #[cfg(test)]
    pub fn yields_event(&self) -> bool {
        !matches!(self, Effect::PushStatus(_) | Effect::ReplaceHistory { .. })
    }
}

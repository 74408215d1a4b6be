//! Events observed while driving a run

use crate::assistants::{Run, ThreadMessage};
use std::time::Duration;

/// Events that trigger phase transitions
#[derive(Debug, Clone)]
pub enum Event {
    // Caller events
    Send { text: String },
    Cancel,

    // Service events
    MessageAppended,
    RunCreated { run_id: String },
    RunObserved { run: Run },
    ToolOutputsSubmitted { run_id: String, count: usize },
    MessagesFetched { messages: Vec<ThreadMessage> },

    // Clock events
    TimedOut { elapsed: Duration },
}

impl Event {
    /// Short name for logs and error messages
    pub fn name(&self) -> &'static str {
        match self {
            Event::Send { .. } => "send",
            Event::Cancel => "cancel",
            Event::MessageAppended => "message_appended",
            Event::RunCreated { .. } => "run_created",
            Event::RunObserved { .. } => "run_observed",
            Event::ToolOutputsSubmitted { .. } => "tool_outputs_submitted",
            Event::MessagesFetched { .. } => "messages_fetched",
            Event::TimedOut { .. } => "timed_out",
        }
    }
}

//! Run lifecycle state machine
//!
//! Pure transitions in the Elm style: `transition` maps a phase and an
//! observed event to the next phase plus the effects the session must
//! execute. All I/O lives in the session.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::Event;
pub use state::{
    project_history, Message, Owner, RunContext, RunPhase, StallReason, UNSUPPORTED_CONTENT,
};
pub use transition::{transition, TransitionError, TransitionResult};

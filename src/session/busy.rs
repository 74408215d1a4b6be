//! Scoped busy flag
//!
//! The flag is raised by acquiring a [`BusyGuard`] and lowered when the
//! guard drops, so every exit path of a send or resolve releases it.

use super::SessionEvent;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Clone)]
pub(crate) struct BusyFlag {
    busy: Arc<AtomicBool>,
    events: broadcast::Sender<SessionEvent>,
}

impl BusyFlag {
    pub(crate) fn new(events: broadcast::Sender<SessionEvent>) -> Self {
        Self {
            busy: Arc::new(AtomicBool::new(false)),
            events,
        }
    }

    /// Raise the flag unless it is already raised
    pub(crate) fn try_acquire(&self) -> Option<BusyGuard> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        let _ = self.events.send(SessionEvent::LoadingChanged(true));
        Some(BusyGuard { flag: self.clone() })
    }

    pub(crate) fn is_set(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Holds the busy flag raised until dropped
#[must_use = "the busy flag is released as soon as the guard is dropped"]
pub(crate) struct BusyGuard {
    flag: BusyFlag,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.flag.busy.store(false, Ordering::Release);
        let _ = self.flag.events.send(SessionEvent::LoadingChanged(false));
    }
}

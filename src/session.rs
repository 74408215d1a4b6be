//! Assistant session
//!
//! A `Session` owns the service handle, the thread identifier, the local
//! conversation history and the status log. The front-end drives it through
//! [`Session::initialize`], [`Session::resolve_thread`] and
//! [`Session::send_message`], and observes it through the projection getters
//! or a [`SessionEvent`] subscription.

mod busy;
mod driver;
mod store;
#[cfg(test)]
pub(crate) mod testing;

pub use store::ThreadStore;

use crate::actions::{ActionDefinition, DisplaySurface};
use crate::assistants::{AssistantService, ServiceError, ServiceFactory};
use crate::config::SessionConfig;
use crate::db::DbError;
use crate::state_machine::{project_history, Message, RunContext, StallReason, TransitionError};
use busy::BusyFlag;
use driver::RunDriver;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// First entry of every status log
pub const INITIAL_STATUS: &str = "Waiting for user input...";

const EVENT_CAPACITY: usize = 256;

/// Change notifications for front-ends
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StatusPushed(String),
    MessagesReplaced(Vec<Message>),
    LoadingChanged(bool),
    ThreadChanged(Option<String>),
}

/// What a resolver pass did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadResolution {
    /// No service handle yet
    NoClient,
    /// A fresh thread was created and persisted
    Created { thread_id: String },
    /// The stored thread's history was loaded
    Resumed {
        thread_id: String,
        message_count: usize,
    },
    /// The service call failed; the session stays not ready
    Unresolved { reason: String },
}

/// How a `send_message` invocation ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Completed,
    Stalled { reason: StallReason },
    Cancelled,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("A run is already in progress")]
    Busy,
    #[error("API key is empty")]
    InvalidCredential,
    #[error("Assistant service error: {0}")]
    Service(#[from] ServiceError),
    #[error("Storage error: {0}")]
    Store(#[from] DbError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

pub struct Session {
    config: SessionConfig,
    factory: ServiceFactory,
    store: Arc<dyn ThreadStore>,
    display: Arc<dyn DisplaySurface>,
    service: RwLock<Option<Arc<dyn AssistantService>>>,
    thread_id: RwLock<Option<String>>,
    history: RwLock<Vec<Message>>,
    status: Mutex<Vec<String>>,
    busy: BusyFlag,
    /// Token of the run in flight, if any
    run_cancel: Mutex<Option<CancellationToken>>,
    events: broadcast::Sender<SessionEvent>,
}

impl Session {
    /// Build a session and load the persisted thread id
    pub async fn new(
        config: SessionConfig,
        factory: ServiceFactory,
        store: Arc<dyn ThreadStore>,
        display: Arc<dyn DisplaySurface>,
    ) -> Result<Self, SessionError> {
        let thread_id = store.load(&config.storage_key).await?;
        tracing::info!(
            storage_key = %config.storage_key,
            thread_id = ?thread_id,
            "Session created"
        );

        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            busy: BusyFlag::new(events.clone()),
            config,
            factory,
            store,
            display,
            service: RwLock::new(None),
            thread_id: RwLock::new(thread_id),
            history: RwLock::new(Vec::new()),
            status: Mutex::new(vec![INITIAL_STATUS.to_string()]),
            run_cancel: Mutex::new(None),
            events,
        })
    }

    // ==================== Lifecycle ====================

    /// Build the service handle from a credential.
    ///
    /// No network traffic happens here. Calling again replaces the handle.
    pub fn initialize(&self, api_key: &str) -> Result<(), SessionError> {
        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(SessionError::InvalidCredential);
        }

        self.push_status("Initializing OpenAI...");
        let service = (self.factory)(api_key)?;
        let replaced = write(&self.service).replace(service).is_some();
        tracing::info!(replaced, "Assistant client initialized");
        Ok(())
    }

    /// Make sure a thread exists: create one when none is stored, otherwise
    /// reload its full history.
    ///
    /// Service failures are recorded in the status log and reported as
    /// [`ThreadResolution::Unresolved`]; nothing is retried.
    pub async fn resolve_thread(&self) -> Result<ThreadResolution, SessionError> {
        let Some(service) = self.service() else {
            return Ok(ThreadResolution::NoClient);
        };
        let _busy = self.busy.try_acquire().ok_or(SessionError::Busy)?;

        let Some(thread_id) = self.current_thread() else {
            self.push_status("Starting new thread...");
            return match service.create_thread().await {
                Ok(thread) => {
                    self.store
                        .save(&self.config.storage_key, Some(&thread.id))
                        .await?;
                    self.set_thread_local(Some(thread.id.clone()));
                    tracing::info!(thread_id = %thread.id, "Thread created");
                    Ok(ThreadResolution::Created {
                        thread_id: thread.id,
                    })
                }
                Err(e) => Ok(self.unresolved("Failed to create thread", &e)),
            };
        };

        self.push_status("Getting existing messages...");
        match service.list_messages(&thread_id).await {
            Ok(remote) => {
                let messages = project_history(&remote);
                let message_count = messages.len();
                self.replace_history(messages);
                tracing::info!(thread_id = %thread_id, message_count, "Thread resumed");
                Ok(ThreadResolution::Resumed {
                    thread_id,
                    message_count,
                })
            }
            Err(e) => Ok(self.unresolved("Failed to load messages", &e)),
        }
    }

    /// Post `text` and drive the resulting run until it settles.
    ///
    /// Returns `Ok(None)` without touching the service when the session is not
    /// ready, and [`SessionError::Busy`] while another run is in flight. The
    /// busy flag is lowered on every return path.
    pub async fn send_message(&self, text: &str) -> Result<Option<RunOutcome>, SessionError> {
        let _busy = self.busy.try_acquire().ok_or(SessionError::Busy)?;

        let (Some(service), Some(thread_id)) = (self.service(), self.current_thread()) else {
            tracing::debug!("Session not ready, message dropped");
            return Ok(None);
        };

        let cancel = CancellationToken::new();
        let _registration = RunRegistration::new(&self.run_cancel, cancel.clone());

        let driver = RunDriver {
            session: self,
            service,
            context: RunContext {
                instructions: self.config.instructions.clone(),
                ..RunContext::new(
                    &thread_id,
                    &self.config.assistant_id,
                    self.config.poll_interval,
                    self.config.max_polls,
                )
            },
            registry: &self.config.registry,
            display: self.display.as_ref(),
            cancel,
            run_timeout: self.config.run_timeout,
        };

        match driver.drive(text.to_string()).await {
            Ok(outcome) => Ok(Some(outcome)),
            Err(e) => {
                tracing::error!(thread_id = %thread_id, error = %e, "Run failed");
                self.push_status(format!("Run failed: {e}"));
                Err(e)
            }
        }
    }

    /// Cancel the run in flight. Returns whether there was one.
    pub fn cancel_run(&self) -> bool {
        match lock(&self.run_cancel).as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Override or clear the thread identifier.
    ///
    /// Local history is cleared when the id changes; the next resolver pass
    /// loads or creates the thread.
    pub async fn set_current_thread(&self, thread_id: Option<String>) -> Result<(), SessionError> {
        let _busy = self.busy.try_acquire().ok_or(SessionError::Busy)?;
        let thread_id = thread_id.filter(|id| !id.trim().is_empty());

        if thread_id == self.current_thread() {
            return Ok(());
        }

        self.store
            .save(&self.config.storage_key, thread_id.as_deref())
            .await?;
        tracing::info!(thread_id = ?thread_id, "Thread identifier changed");
        self.set_thread_local(thread_id);
        self.replace_history(Vec::new());
        Ok(())
    }

    // ==================== Projections ====================

    pub fn status(&self) -> Vec<String> {
        lock(&self.status).clone()
    }

    pub fn messages(&self) -> Vec<Message> {
        read(&self.history).clone()
    }

    pub fn loading(&self) -> bool {
        self.busy.is_set()
    }

    /// Both a service handle and a thread id are present
    pub fn is_ready(&self) -> bool {
        read(&self.service).is_some() && read(&self.thread_id).is_some()
    }

    pub fn current_thread(&self) -> Option<String> {
        read(&self.thread_id).clone()
    }

    pub fn action_definitions(&self) -> Vec<ActionDefinition> {
        self.config.registry.definitions()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    // ==================== Internal ====================

    fn service(&self) -> Option<Arc<dyn AssistantService>> {
        read(&self.service).clone()
    }

    pub(crate) fn push_status(&self, status: impl Into<String>) {
        let status = status.into();
        tracing::debug!(status = %status, "Status");
        lock(&self.status).push(status.clone());
        let _ = self.events.send(SessionEvent::StatusPushed(status));
    }

    pub(crate) fn replace_history(&self, messages: Vec<Message>) {
        *write(&self.history) = messages.clone();
        let _ = self.events.send(SessionEvent::MessagesReplaced(messages));
    }

    fn set_thread_local(&self, thread_id: Option<String>) {
        *write(&self.thread_id) = thread_id.clone();
        let _ = self.events.send(SessionEvent::ThreadChanged(thread_id));
    }

    fn unresolved(&self, what: &str, error: &ServiceError) -> ThreadResolution {
        tracing::warn!(error = %error, kind = ?error.kind, "{what}");
        self.push_status(format!("{what}: {error}"));
        ThreadResolution::Unresolved {
            reason: error.to_string(),
        }
    }
}

/// Publishes the run's cancellation token for the duration of a send
struct RunRegistration<'a> {
    slot: &'a Mutex<Option<CancellationToken>>,
}

impl<'a> RunRegistration<'a> {
    fn new(slot: &'a Mutex<Option<CancellationToken>>, token: CancellationToken) -> Self {
        *lock(slot) = Some(token);
        Self { slot }
    }
}

impl Drop for RunRegistration<'_> {
    fn drop(&mut self) {
        lock(self.slot).take();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

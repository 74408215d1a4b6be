//! Hosted assistant service abstraction
//!
//! The session drives runs through the `AssistantService` trait so the
//! lifecycle logic never depends on a concrete HTTP client.

mod error;
pub mod openai;
mod types;

pub use error::{ServiceError, ServiceErrorKind};
pub use openai::OpenAiAssistants;
pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

/// Operations consumed from the assistant service
#[async_trait]
pub trait AssistantService: Send + Sync {
    /// Create an empty conversation thread
    async fn create_thread(&self) -> Result<Thread, ServiceError>;

    /// Full message list of a thread, oldest first
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, ServiceError>;

    /// Post a user message to a thread
    async fn create_message(&self, thread_id: &str, text: &str)
        -> Result<ThreadMessage, ServiceError>;

    /// Start a run of an assistant over a thread
    async fn create_run(&self, thread_id: &str, params: &CreateRun) -> Result<Run, ServiceError>;

    /// Fetch the current state of a run
    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, ServiceError>;

    /// Answer every pending tool call of a run in one batch
    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<Run, ServiceError>;
}

/// Builds a service handle from a credential. Must not touch the network.
pub type ServiceFactory =
    Arc<dyn Fn(&str) -> Result<Arc<dyn AssistantService>, ServiceError> + Send + Sync>;

/// Factory for the `OpenAI` Assistants API, wrapped in call logging
pub fn openai_factory(base_url: impl Into<String>) -> ServiceFactory {
    let base_url = base_url.into();
    Arc::new(
        move |api_key: &str| -> Result<Arc<dyn AssistantService>, ServiceError> {
            let service = OpenAiAssistants::new(api_key, &base_url)?;
            Ok(Arc::new(LoggingService::new(Arc::new(service))))
        },
    )
}

/// Logging wrapper for assistant services
pub struct LoggingService {
    inner: Arc<dyn AssistantService>,
}

impl LoggingService {
    pub fn new(inner: Arc<dyn AssistantService>) -> Self {
        Self { inner }
    }
}

fn log_call<T>(operation: &str, started: Instant, result: &Result<T, ServiceError>) {
    let duration_ms = started.elapsed().as_millis();
    match result {
        Ok(_) => {
            tracing::debug!(operation, duration_ms = %duration_ms, "Assistant call completed");
        }
        Err(e) => {
            tracing::error!(
                operation,
                duration_ms = %duration_ms,
                error = %e.message,
                kind = ?e.kind,
                retryable = e.kind.is_retryable(),
                retry_after = ?e.retry_after,
                "Assistant call failed"
            );
        }
    }
}

#[async_trait]
impl AssistantService for LoggingService {
    async fn create_thread(&self) -> Result<Thread, ServiceError> {
        let started = Instant::now();
        let result = self.inner.create_thread().await;
        log_call("create_thread", started, &result);
        result
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, ServiceError> {
        let started = Instant::now();
        let result = self.inner.list_messages(thread_id).await;
        if let Ok(messages) = &result {
            tracing::debug!(thread_id, count = messages.len(), "Listed thread messages");
        }
        log_call("list_messages", started, &result);
        result
    }

    async fn create_message(
        &self,
        thread_id: &str,
        text: &str,
    ) -> Result<ThreadMessage, ServiceError> {
        let started = Instant::now();
        let result = self.inner.create_message(thread_id, text).await;
        log_call("create_message", started, &result);
        result
    }

    async fn create_run(&self, thread_id: &str, params: &CreateRun) -> Result<Run, ServiceError> {
        let started = Instant::now();
        let result = self.inner.create_run(thread_id, params).await;
        if let Ok(run) = &result {
            tracing::info!(
                thread_id,
                run_id = %run.id,
                assistant_id = %params.assistant_id,
                "Run created"
            );
        }
        log_call("create_run", started, &result);
        result
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, ServiceError> {
        let started = Instant::now();
        let result = self.inner.get_run(thread_id, run_id).await;
        if let Ok(run) = &result {
            tracing::debug!(thread_id, run_id, status = %run.status, "Run polled");
        }
        log_call("get_run", started, &result);
        result
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<Run, ServiceError> {
        let started = Instant::now();
        let result = self
            .inner
            .submit_tool_outputs(thread_id, run_id, outputs)
            .await;
        if result.is_ok() {
            tracing::info!(thread_id, run_id, count = outputs.len(), "Submitted tool outputs");
        }
        log_call("submit_tool_outputs", started, &result);
        result
    }
}

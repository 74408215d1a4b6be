//! Mock implementations for testing
//!
//! These mocks enable session testing without real I/O.

use super::store::ThreadStore;
use crate::actions::DisplaySurface;
use crate::assistants::{
    AssistantService, CreateRun, MessageContent, MessageRole, RequiredAction, Run, RunStatus,
    ServiceError, ServiceFactory, SubmitToolOutputs, Thread, ThreadMessage, ToolCallRequest,
    ToolOutput,
};
use crate::db::DbError;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

// ============================================================================
// Mock Assistant Service
// ============================================================================

/// A service call as seen by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateThread,
    ListMessages {
        thread_id: String,
    },
    CreateMessage {
        thread_id: String,
        text: String,
    },
    CreateRun {
        thread_id: String,
        assistant_id: String,
        instructions: String,
    },
    GetRun {
        run_id: String,
    },
    SubmitToolOutputs {
        run_id: String,
        outputs: Vec<ToolOutput>,
    },
}

/// One scripted answer to `get_run`
#[derive(Debug, Clone)]
pub enum Observation {
    Status(RunStatus),
    ToolCalls(Vec<ToolCallRequest>),
    Error(ServiceError),
}

/// In-memory assistant service driven by a script of run observations.
///
/// Once the script is exhausted every poll reports `completed`. A completed
/// run appends one assistant reply to its thread.
pub struct MockAssistantService {
    threads: Mutex<HashMap<String, Vec<ThreadMessage>>>,
    observations: Mutex<VecDeque<Observation>>,
    failures: Mutex<HashMap<&'static str, ServiceError>>,
    replied: Mutex<Vec<String>>,
    next_id: Mutex<u32>,
    reply: String,
    /// Record of all calls made
    pub calls: Mutex<Vec<Call>>,
}

impl MockAssistantService {
    pub fn new() -> Self {
        Self {
            threads: Mutex::new(HashMap::new()),
            observations: Mutex::new(VecDeque::new()),
            failures: Mutex::new(HashMap::new()),
            replied: Mutex::new(Vec::new()),
            next_id: Mutex::new(0),
            reply: "Hello from the assistant".to_string(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Seed an existing thread with messages
    pub fn with_thread(self, thread_id: &str, messages: Vec<ThreadMessage>) -> Self {
        self.threads
            .lock()
            .unwrap()
            .insert(thread_id.to_string(), messages);
        self
    }

    /// Queue the next `get_run` answer
    pub fn queue(&self, observation: Observation) {
        self.observations.lock().unwrap().push_back(observation);
    }

    /// Queue `count` pending observations
    pub fn queue_pending(&self, count: usize) {
        for _ in 0..count {
            self.queue(Observation::Status(RunStatus::InProgress));
        }
    }

    /// Make the next call of `operation` fail
    pub fn fail_next(&self, operation: &'static str, error: ServiceError) {
        self.failures.lock().unwrap().insert(operation, error);
    }

    pub fn recorded_calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count_calls(&self, matches: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| matches(c)).count()
    }

    pub fn thread_messages(&self, thread_id: &str) -> Vec<ThreadMessage> {
        self.threads
            .lock()
            .unwrap()
            .get(thread_id)
            .cloned()
            .unwrap_or_default()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_failure(&self, operation: &'static str) -> Result<(), ServiceError> {
        match self.failures.lock().unwrap().remove(operation) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn next_id(&self, prefix: &str) -> String {
        let mut next = self.next_id.lock().unwrap();
        *next += 1;
        format!("{prefix}_{next}")
    }

    fn push_message(&self, thread_id: &str, role: MessageRole, text: &str) -> ThreadMessage {
        let message = ThreadMessage {
            id: self.next_id("msg"),
            role,
            content: vec![MessageContent::text(text)],
        };
        self.threads
            .lock()
            .unwrap()
            .entry(thread_id.to_string())
            .or_default()
            .push(message.clone());
        message
    }
}

impl Default for MockAssistantService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssistantService for MockAssistantService {
    async fn create_thread(&self) -> Result<Thread, ServiceError> {
        self.record(Call::CreateThread);
        self.check_failure("create_thread")?;
        let id = self.next_id("thread");
        self.threads.lock().unwrap().insert(id.clone(), Vec::new());
        Ok(Thread { id })
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, ServiceError> {
        self.record(Call::ListMessages {
            thread_id: thread_id.to_string(),
        });
        self.check_failure("list_messages")?;
        self.threads
            .lock()
            .unwrap()
            .get(thread_id)
            .cloned()
            .ok_or_else(|| {
                ServiceError::not_found(format!("No thread found with id '{thread_id}'"))
            })
    }

    async fn create_message(
        &self,
        thread_id: &str,
        text: &str,
    ) -> Result<ThreadMessage, ServiceError> {
        self.record(Call::CreateMessage {
            thread_id: thread_id.to_string(),
            text: text.to_string(),
        });
        self.check_failure("create_message")?;
        Ok(self.push_message(thread_id, MessageRole::User, text))
    }

    async fn create_run(&self, thread_id: &str, params: &CreateRun) -> Result<Run, ServiceError> {
        self.record(Call::CreateRun {
            thread_id: thread_id.to_string(),
            assistant_id: params.assistant_id.clone(),
            instructions: params.instructions.clone(),
        });
        self.check_failure("create_run")?;
        Ok(Run {
            id: self.next_id("run"),
            status: RunStatus::Queued,
            required_action: None,
        })
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, ServiceError> {
        self.record(Call::GetRun {
            run_id: run_id.to_string(),
        });
        self.check_failure("get_run")?;

        let observation = self
            .observations
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Observation::Status(RunStatus::Completed));

        let (status, required_action) = match observation {
            Observation::Error(error) => return Err(error),
            Observation::Status(status) => (status, None),
            Observation::ToolCalls(tool_calls) => (
                RunStatus::RequiresAction,
                Some(RequiredAction::SubmitToolOutputs {
                    submit_tool_outputs: SubmitToolOutputs { tool_calls },
                }),
            ),
        };

        if status == RunStatus::Completed {
            let first_completion = {
                let mut replied = self.replied.lock().unwrap();
                let first = !replied.iter().any(|r| r == run_id);
                if first {
                    replied.push(run_id.to_string());
                }
                first
            };
            if first_completion {
                self.push_message(thread_id, MessageRole::Assistant, &self.reply);
            }
        }

        Ok(Run {
            id: run_id.to_string(),
            status,
            required_action,
        })
    }

    async fn submit_tool_outputs(
        &self,
        _thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<Run, ServiceError> {
        self.record(Call::SubmitToolOutputs {
            run_id: run_id.to_string(),
            outputs: outputs.to_vec(),
        });
        self.check_failure("submit_tool_outputs")?;
        Ok(Run {
            id: run_id.to_string(),
            status: RunStatus::Queued,
            required_action: None,
        })
    }
}

/// Factory that hands out the same mock for every credential
pub fn mock_factory(service: Arc<MockAssistantService>) -> ServiceFactory {
    Arc::new(
        move |_api_key: &str| -> Result<Arc<dyn AssistantService>, ServiceError> {
            Ok(service.clone())
        },
    )
}

/// Factory that rejects every credential
pub fn rejecting_factory() -> ServiceFactory {
    Arc::new(
        |_api_key: &str| -> Result<Arc<dyn AssistantService>, ServiceError> {
            Err(ServiceError::auth("Incorrect API key provided"))
        },
    )
}

// ============================================================================
// Recording Display
// ============================================================================

/// Display that records every property write
#[derive(Default)]
pub struct RecordingDisplay {
    pub properties: Mutex<Vec<(String, String)>>,
}

impl RecordingDisplay {
    pub fn recorded(&self) -> Vec<(String, String)> {
        self.properties.lock().unwrap().clone()
    }
}

impl DisplaySurface for RecordingDisplay {
    fn set_property(&self, name: &str, value: &str) {
        self.properties
            .lock()
            .unwrap()
            .push((name.to_string(), value.to_string()));
    }
}

// ============================================================================
// In-Memory Thread Store
// ============================================================================

#[derive(Default)]
pub struct InMemoryThreadStore {
    values: Mutex<HashMap<String, String>>,
    /// Number of writes, including removals
    pub writes: Mutex<usize>,
}

impl InMemoryThreadStore {
    pub fn with_value(key: &str, value: &str) -> Self {
        let store = Self::default();
        store
            .values
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        store
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values.lock().unwrap().get(key).cloned()
    }

    pub fn write_count(&self) -> usize {
        *self.writes.lock().unwrap()
    }
}

#[async_trait]
impl ThreadStore for InMemoryThreadStore {
    async fn load(&self, key: &str) -> Result<Option<String>, DbError> {
        Ok(self.get(key))
    }

    async fn save(&self, key: &str, value: Option<&str>) -> Result<(), DbError> {
        *self.writes.lock().unwrap() += 1;
        let mut values = self.values.lock().unwrap();
        match value {
            Some(value) => values.insert(key.to_string(), value.to_string()),
            None => values.remove(key),
        };
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

pub fn text_message(id: &str, role: MessageRole, text: &str) -> ThreadMessage {
    ThreadMessage {
        id: id.to_string(),
        role,
        content: vec![MessageContent::text(text)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_scripted_runs() {
        let mock = MockAssistantService::new();
        mock.queue_pending(1);
        mock.queue(Observation::Error(ServiceError::server_error("boom")));

        let thread = mock.create_thread().await.unwrap();
        let run = mock
            .create_run(
                &thread.id,
                &CreateRun {
                    assistant_id: "asst_1".into(),
                    instructions: String::new(),
                },
            )
            .await
            .unwrap();

        assert_eq!(
            mock.get_run(&thread.id, &run.id).await.unwrap().status,
            RunStatus::InProgress
        );
        assert!(mock.get_run(&thread.id, &run.id).await.is_err());
        assert_eq!(
            mock.get_run(&thread.id, &run.id).await.unwrap().status,
            RunStatus::Completed
        );
        // Reply is appended once per run
        mock.get_run(&thread.id, &run.id).await.unwrap();
        assert_eq!(mock.thread_messages(&thread.id).len(), 1);
    }

    #[tokio::test]
    async fn test_mock_failure_injection() {
        let mock = MockAssistantService::new();
        mock.fail_next("create_thread", ServiceError::network("offline"));

        assert!(mock.create_thread().await.is_err());
        assert!(mock.create_thread().await.is_ok());
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = InMemoryThreadStore::default();

        store.save("thread_id", Some("t1")).await.unwrap();
        assert_eq!(store.load("thread_id").await.unwrap().as_deref(), Some("t1"));

        store.save("thread_id", None).await.unwrap();
        assert_eq!(store.load("thread_id").await.unwrap(), None);
        assert_eq!(store.write_count(), 2);
    }
}

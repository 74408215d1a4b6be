//! `OpenAI` Assistants (v2) REST implementation

use super::types::{CreateRun, MessagePage, Run, Thread, ThreadMessage, ToolOutput};
use super::{AssistantService, ServiceError};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Assistants endpoints are gated behind this beta header
const ASSISTANTS_BETA: &str = "assistants=v2";

/// Largest page size the listing endpoint accepts
const PAGE_LIMIT: u32 = 100;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Assistants API client bound to one credential
pub struct OpenAiAssistants {
    client: Client,
    api_key: String,
    base_url: String,
}

impl OpenAiAssistants {
    /// Build the client. No request is sent until the first operation.
    pub fn new(api_key: impl Into<String>, base_url: &str) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ServiceError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ServiceError> {
        let response = request
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", ASSISTANTS_BETA)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ServiceError::network(format!("Request timeout: {e}"))
                } else if e.is_connect() {
                    ServiceError::network(format!("Connection failed: {e}"))
                } else {
                    ServiceError::unknown(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs);

        let body = response
            .text()
            .await
            .map_err(|e| ServiceError::network(format!("Failed to read response: {e}")))?;

        if !status.is_success() {
            let err = classify_error(status, &body);
            return Err(match retry_after {
                Some(after) => err.with_retry_after(after),
                None => err,
            });
        }

        serde_json::from_str(&body).map_err(|e| {
            ServiceError::unknown(format!("Failed to parse response: {e} - body: {body}"))
        })
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Map a non-success HTTP response onto a classified error
pub(crate) fn classify_error(status: StatusCode, body: &str) -> ServiceError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map_or_else(|_| body.to_string(), |e| e.error.message);

    match status.as_u16() {
        401 | 403 => ServiceError::auth(format!("Authentication failed: {message}")),
        404 => ServiceError::not_found(format!("Not found: {message}")),
        429 => ServiceError::rate_limit(format!("Rate limited: {message}")),
        400 | 422 => ServiceError::invalid_request(format!("Invalid request: {message}")),
        500..=599 => ServiceError::server_error(format!("Server error: {message}")),
        _ => ServiceError::unknown(format!("HTTP {status}: {message}")),
    }
}

fn page_url(base: &str, after: Option<&str>) -> String {
    match after {
        Some(cursor) => format!("{base}&after={cursor}"),
        None => base.to_string(),
    }
}

/// Follow `has_more`/`last_id` cursors until the listing is exhausted
pub(crate) async fn collect_pages<F, Fut>(
    mut fetch: F,
) -> Result<Vec<ThreadMessage>, ServiceError>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<MessagePage, ServiceError>>,
{
    let mut messages = Vec::new();
    let mut after = None;

    loop {
        let page = fetch(after.take()).await?;
        messages.extend(page.data);

        match (page.has_more, page.last_id) {
            (true, Some(last)) => after = Some(last),
            _ => break,
        }
    }

    Ok(messages)
}

#[async_trait]
impl AssistantService for OpenAiAssistants {
    async fn create_thread(&self) -> Result<Thread, ServiceError> {
        let request = self.client.post(self.url("threads")).json(&json!({}));
        self.send(request).await
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, ServiceError> {
        let base = self.url(&format!(
            "threads/{thread_id}/messages?order=asc&limit={PAGE_LIMIT}"
        ));
        let base = base.as_str();
        let this = self;
        collect_pages(move |after| {
            let request = this.client.get(page_url(base, after.as_deref()));
            this.send(request)
        })
        .await
    }

    async fn create_message(
        &self,
        thread_id: &str,
        text: &str,
    ) -> Result<ThreadMessage, ServiceError> {
        let request = self
            .client
            .post(self.url(&format!("threads/{thread_id}/messages")))
            .json(&json!({ "role": "user", "content": text }));
        self.send(request).await
    }

    async fn create_run(&self, thread_id: &str, params: &CreateRun) -> Result<Run, ServiceError> {
        let request = self
            .client
            .post(self.url(&format!("threads/{thread_id}/runs")))
            .json(params);
        self.send(request).await
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, ServiceError> {
        let request = self
            .client
            .get(self.url(&format!("threads/{thread_id}/runs/{run_id}")));
        self.send(request).await
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: &[ToolOutput],
    ) -> Result<Run, ServiceError> {
        let request = self
            .client
            .post(self.url(&format!(
                "threads/{thread_id}/runs/{run_id}/submit_tool_outputs"
            )))
            .json(&json!({ "tool_outputs": outputs }));
        self.send(request).await
    }
}

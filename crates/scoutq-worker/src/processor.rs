//! The external collaborator that does the actual scraping and analysis.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use scoutq_core::Platform;
use scoutq_ledger::ClaimedTask;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("processor answered HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed processor response: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("invalid processor URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("{0}")]
    Other(String),
}

/// One sequenced output to persist for the task's subject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactPayload {
    /// Artifact family, e.g. `recommendation`.
    pub kind: String,
    pub body: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessOutput {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    /// Raw profile snapshot in any of the upstream field spellings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Value>,
    #[serde(default)]
    pub artifacts: Vec<ArtifactPayload>,
}

impl ProcessOutput {
    #[must_use]
    pub fn succeeded(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            ..Self::default()
        }
    }
}

#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(&self, task: &ClaimedTask) -> Result<ProcessOutput, ProcessorError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProcessRequest<'a> {
    platform: Platform,
    subject: &'a str,
    account_info: &'a scoutq_core::TaskRecord,
}

/// Delegates processing to an HTTP endpoint.
///
/// POSTs `{platform, subject, accountInfo}` and expects a [`ProcessOutput`]
/// JSON body back.
pub struct HttpProcessor {
    client: Client,
    url: Url,
}

impl HttpProcessor {
    /// # Errors
    ///
    /// Returns [`ProcessorError::Http`] if the `reqwest::Client` cannot be
    /// built or [`ProcessorError::InvalidUrl`] if `url` does not parse.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, ProcessorError> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent("scoutq/0.1")
            .build()?;
        let url = Url::parse(url).map_err(|e| ProcessorError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl Processor for HttpProcessor {
    async fn process(&self, task: &ClaimedTask) -> Result<ProcessOutput, ProcessorError> {
        let request = ProcessRequest {
            platform: task.platform,
            subject: &task.subject,
            account_info: &task.record,
        };
        let response = self
            .client
            .post(self.url.clone())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ProcessorError::Status {
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body).map_err(ProcessorError::Decode)
    }
}

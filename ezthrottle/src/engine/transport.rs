//! The network seam between the engine and the outside world.

use crate::errors::RemoteRejection;
use crate::step::{
    ExecutionMode, RegionPolicy, RetryPolicy, Step, Target, Webhook, STATUS_TIMEOUT,
    STATUS_TRANSPORT_ERROR,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Response of a local HTTP call.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LocalResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Response body as text.
    #[serde(default)]
    pub body: String,
}

impl LocalResponse {
    /// Creates a response with a status and body.
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    /// Returns true for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A call that failed before any HTTP response arrived.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The call exceeded its deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    /// Connection, TLS or protocol failure.
    #[error("connection failed: {0}")]
    Connection(String),
}

impl TransportError {
    /// The synthetic status recorded in verdicts for this failure.
    #[must_use]
    pub fn synthetic_status(&self) -> u16 {
        match self {
            Self::Timeout(_) => STATUS_TIMEOUT,
            Self::Connection(_) => STATUS_TRANSPORT_ERROR,
        }
    }
}

/// Job-creation payload sent to the backend.
///
/// A forwarded FRUGAL step and a PERFORMANCE step with the same fields
/// produce identical payloads; the backend only ever runs jobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    /// Target URL.
    pub url: String,
    /// Upper-cased HTTP method.
    pub method: String,
    /// Request headers.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    /// Request body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    /// Pass-through metadata echoed in completion webhooks.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Completion webhooks.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub webhooks: Vec<Webhook>,
    /// Minimum voting webhooks that must succeed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_quorum: Option<u32>,
    /// Preferred regions in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub regions: Vec<String>,
    /// Region selection policy.
    #[serde(default)]
    pub region_policy: RegionPolicy,
    /// Multi-region execution mode.
    #[serde(default)]
    pub execution_mode: ExecutionMode,
    /// Backend retry and reroute budget.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_policy: Option<RetryPolicy>,
    /// Earliest execution time in unix milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_at: Option<i64>,
    /// Deduplication key.
    pub idempotent_key: String,
}

impl JobRequest {
    /// Builds the submission for a step and its resolved idempotency key.
    #[must_use]
    pub fn from_step(step: &Step, idempotent_key: impl Into<String>) -> Self {
        let Target {
            url,
            method,
            headers,
            body,
        } = step.target().clone();

        Self {
            url,
            method,
            headers,
            body,
            metadata: step.metadata().clone(),
            webhooks: step.webhooks().to_vec(),
            webhook_quorum: step.webhook_quorum(),
            regions: step.regions().to_vec(),
            region_policy: step.region_policy(),
            execution_mode: step.execution_mode(),
            retry_policy: step.retry_policy().cloned(),
            retry_at: step.retry_at(),
            idempotent_key: idempotent_key.into(),
        }
    }
}

/// The backend's acknowledgement of an accepted job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSubmission {
    /// Backend job identifier.
    pub job_id: String,
    /// Backend-reported job status (e.g., "queued").
    #[serde(default)]
    pub status: String,
    /// The key the backend deduplicated on, when echoed back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotent_key: Option<String>,
}

/// A job submission that did not produce an accepted job.
#[derive(Debug, Clone, Error)]
pub enum SubmitError {
    /// The backend or its proxy declined the job.
    #[error(transparent)]
    Rejected(#[from] RemoteRejection),
    /// The submission never got an answer.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl SubmitError {
    /// Status recorded in the verdict for this failure.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::Rejected(rejection) => rejection.status,
            Self::Transport(err) => err.synthetic_status(),
        }
    }

    /// Converts into the rejection reported to callers.
    #[must_use]
    pub fn into_rejection(self) -> RemoteRejection {
        match self {
            Self::Rejected(rejection) => rejection,
            Self::Transport(err) => RemoteRejection::new(err.synthetic_status(), err.to_string()),
        }
    }
}

/// Performs local calls and backend submissions for the engine.
///
/// [`crate::client::EzThrottleClient`] is the production implementation;
/// [`crate::testing::MockTransport`] scripts responses for tests.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Executes the target HTTP call directly, giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns a [`TransportError`] when no response was received. Non-2xx
    /// responses are returned as `Ok`.
    async fn send(&self, target: &Target, timeout: Duration)
        -> Result<LocalResponse, TransportError>;

    /// Submits a job to the backend.
    ///
    /// # Errors
    ///
    /// Returns a [`SubmitError`] when the job was not accepted.
    async fn submit_job(&self, job: &JobRequest) -> Result<JobSubmission, SubmitError>;
}

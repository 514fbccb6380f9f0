//! Error types for the ezthrottle client.
//!
//! The taxonomy separates problems found while assembling a workflow
//! (construction), problems reported by a step's own HTTP call (local
//! execution), refusals from the remote backend (rejection) and inbound
//! webhook signature failures (verification).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for ezthrottle operations.
#[derive(Debug, Error)]
pub enum EzThrottleError {
    /// The workflow could not be finalized.
    #[error("{0}")]
    Construction(#[from] ConstructionError),

    /// A FRUGAL step failed locally and was not eligible for forwarding.
    #[error("{0}")]
    LocalExecution(#[from] LocalExecutionFailure),

    /// The remote backend declined a job submission.
    #[error("{0}")]
    RemoteRejection(#[from] RemoteRejection),

    /// An inbound webhook failed signature verification.
    #[error("{0}")]
    WebhookVerification(#[from] WebhookVerificationError),

    /// A webhook secret does not meet the minimum requirements.
    #[error("Invalid webhook secret: {0}")]
    InvalidSecret(String),

    /// Client configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The underlying HTTP transport failed.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The traversal was cancelled before the next step started.
    #[error("Workflow cancelled: {0}")]
    Cancelled(String),
}

impl From<serde_json::Error> for EzThrottleError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for EzThrottleError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// A single constraint violated by a step descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Violation code (e.g., "STEP-004-CYCLE").
    pub code: String,
    /// Human-readable description.
    pub message: String,
    /// Edge path from the root to the offending step (e.g., "root.on_success").
    pub path: String,
    /// Hint for fixing the violation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_hint: Option<String>,
}

impl Violation {
    /// Creates a new violation.
    #[must_use]
    pub fn new(code: impl Into<String>, path: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        let fix_hint = ConstructionSuggestions::get(&code).map(str::to_string);
        Self {
            code,
            message: message.into(),
            path: path.into(),
            fix_hint,
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("code".to_string(), serde_json::json!(self.code));
        map.insert("message".to_string(), serde_json::json!(self.message));
        map.insert("path".to_string(), serde_json::json!(self.path));
        if let Some(ref hint) = self.fix_hint {
            map.insert("fix_hint".to_string(), serde_json::json!(hint));
        }
        map
    }
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.code, self.path, self.message)
    }
}

/// Error raised when a step workflow fails validation at finalize time.
///
/// Every violated constraint found in the tree is listed, not just the first.
#[derive(Debug, Clone, Error)]
#[error("Invalid step workflow ({} violation(s)): {}", violations.len(), render(violations))]
pub struct ConstructionError {
    /// All violations found, in tree order.
    pub violations: Vec<Violation>,
}

fn render(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ConstructionError {
    /// Creates a construction error from a list of violations.
    #[must_use]
    pub fn new(violations: Vec<Violation>) -> Self {
        Self { violations }
    }

    /// Returns true if any violation carries the given code.
    #[must_use]
    pub fn has_code(&self, code: &str) -> bool {
        self.violations.iter().any(|v| v.code == code)
    }

    /// Returns the violation codes in order.
    #[must_use]
    pub fn codes(&self) -> Vec<&str> {
        self.violations.iter().map(|v| v.code.as_str()).collect()
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map.insert(
            "violations".to_string(),
            serde_json::Value::Array(
                self.violations
                    .iter()
                    .map(|v| serde_json::Value::Object(v.to_dict().into_iter().collect()))
                    .collect(),
            ),
        );
        map
    }
}

/// A FRUGAL step's local call ended in a non-2xx status or transport error.
#[derive(Debug, Clone, Error)]
#[error("Step '{step}' failed locally with status {status}: {message}")]
pub struct LocalExecutionFailure {
    /// The step label.
    pub step: String,
    /// HTTP status, or a synthetic status for transport failures.
    pub status: u16,
    /// Failure details.
    pub message: String,
}

impl LocalExecutionFailure {
    /// Creates a new local execution failure.
    #[must_use]
    pub fn new(step: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            status,
            message: message.into(),
        }
    }
}

/// The remote backend declined a submission.
#[derive(Debug, Clone, Error)]
#[error("Job submission rejected (status {status}): {message}")]
pub struct RemoteRejection {
    /// Status reported by the backend or proxy.
    pub status: u16,
    /// Rejection details.
    pub message: String,
    /// Unix milliseconds after which the submission may be retried.
    pub retry_at: Option<i64>,
}

impl RemoteRejection {
    /// Creates a new remote rejection.
    #[must_use]
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            retry_at: None,
        }
    }

    /// Sets the retry-at timestamp.
    #[must_use]
    pub fn with_retry_at(mut self, retry_at: i64) -> Self {
        self.retry_at = Some(retry_at);
        self
    }

    /// Returns true if the rejection came from rate limiting.
    #[must_use]
    pub fn is_rate_limited(&self) -> bool {
        self.status == 429
    }
}

/// Raised by the strict webhook verification variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Webhook signature verification failed: {reason}")]
pub struct WebhookVerificationError {
    /// The failure reason (e.g., "signature_mismatch").
    pub reason: String,
}

impl WebhookVerificationError {
    /// Creates a new verification error.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Provides default suggestions for construction violation codes.
pub struct ConstructionSuggestions;

impl ConstructionSuggestions {
    /// Gets a suggestion for a given violation code.
    #[must_use]
    pub fn get(code: &str) -> Option<&'static str> {
        match code {
            codes::EMPTY_URL => Some("Call `.url(...)` with the target endpoint."),
            codes::CUSTOM_KEY => Some(
                "Pass a non-empty key to `.idempotent_key(...)` or pick the HASH or UNIQUE strategy.",
            ),
            codes::QUORUM => Some(
                "Lower `webhook_quorum` or mark more webhooks with `has_quorum_vote = true`.",
            ),
            codes::CYCLE => Some(
                "A step cannot be attached below itself. Build a fresh step for the child edge.",
            ),
            codes::FALLBACK_TRIGGER => Some(
                "Give the fallback at least one status code, or use `fallback_on_timeout`.",
            ),
            codes::WEBHOOK_URL => Some("Every webhook needs a non-empty URL."),
            codes::REGION => Some("Region identifiers must be non-empty."),
            codes::RETRY_CODES => Some(
                "Provide the status codes that should trigger retries or reroutes, or set the count to 0.",
            ),
            codes::TIMEOUT => Some("Use a local timeout greater than zero."),
            codes::METHOD => Some("Use a standard HTTP method such as GET or POST."),
            _ => None,
        }
    }
}

/// Construction violation codes.
pub mod codes {
    /// `target.url` is empty.
    pub const EMPTY_URL: &str = "STEP-001-EMPTY_URL";
    /// CUSTOM strategy without a key.
    pub const CUSTOM_KEY: &str = "STEP-002-CUSTOM_KEY";
    /// Webhook quorum is zero or exceeds voting webhooks.
    pub const QUORUM: &str = "STEP-003-QUORUM";
    /// A step is reachable from itself.
    pub const CYCLE: &str = "STEP-004-CYCLE";
    /// Fallback edge with an empty trigger set.
    pub const FALLBACK_TRIGGER: &str = "STEP-005-FALLBACK_TRIGGER";
    /// Webhook with an empty URL.
    pub const WEBHOOK_URL: &str = "STEP-006-WEBHOOK_URL";
    /// Empty region identifier.
    pub const REGION: &str = "STEP-007-REGION";
    /// Retry or reroute count without codes.
    pub const RETRY_CODES: &str = "STEP-008-RETRY_CODES";
    /// Zero local timeout.
    pub const TIMEOUT: &str = "STEP-009-TIMEOUT";
    /// HTTP method is not a valid token.
    pub const METHOD: &str = "STEP-010-METHOD";
}

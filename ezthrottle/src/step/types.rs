//! Value types shared by step builders and finalized steps.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

/// Synthetic status for a local call that failed before a response arrived.
pub const STATUS_TRANSPORT_ERROR: u16 = 0;

/// Synthetic status for a local call that exceeded its timeout.
pub const STATUS_TIMEOUT: u16 = 1;

/// Status recorded when the backend accepts a job.
pub const STATUS_ACCEPTED: u16 = 201;

/// Returns true for statuses that no real HTTP response can carry.
#[must_use]
pub const fn is_synthetic_status(status: u16) -> bool {
    status < 100
}

/// Status codes forwarded to the backend by default for FRUGAL steps.
#[must_use]
pub fn default_fallback_on_error() -> BTreeSet<u16> {
    [429, 500, 502, 503, 504].into_iter().collect()
}

/// Step execution strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepType {
    /// Submitted directly to the backend.
    #[default]
    Performance,
    /// Executed locally first, forwarded only on selected error codes.
    Frugal,
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Performance => write!(f, "performance"),
            Self::Frugal => write!(f, "frugal"),
        }
    }
}

/// How the idempotency key of a step is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdempotentStrategy {
    /// Deterministic digest of (url, method, body, customer).
    #[default]
    Hash,
    /// Fresh random key per resolution.
    Unique,
    /// Caller-supplied key, used verbatim.
    Custom,
}

/// Region selection policy, interpreted by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionPolicy {
    /// Only the listed regions may run the job.
    Strict,
    /// Other regions may be used when the listed ones are unavailable.
    #[default]
    Fallback,
}

/// Multi-region execution mode, interpreted by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// All regions race; first success wins.
    #[default]
    Race,
    /// Regions are tried one after another.
    Sequential,
}

/// The HTTP call a step performs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Target {
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
}

impl Target {
    /// Creates a GET target for the URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "GET".to_string(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// Returns the body, or an empty string when absent.
    #[must_use]
    pub fn body_or_empty(&self) -> &str {
        self.body.as_deref().unwrap_or("")
    }
}

/// Retry and reroute configuration handed to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum retries in the same region.
    pub max_retries: u32,
    /// Maximum reroutes to other regions.
    pub max_reroutes: u32,
    /// Statuses that trigger a retry.
    #[serde(default)]
    pub retry_codes: BTreeSet<u16>,
    /// Statuses that trigger a reroute.
    #[serde(default)]
    pub reroute_codes: BTreeSet<u16>,
}

impl RetryPolicy {
    /// Creates an empty retry policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the retry budget and its trigger codes.
    #[must_use]
    pub fn with_retries(mut self, max: u32, codes: impl IntoIterator<Item = u16>) -> Self {
        self.max_retries = max;
        self.retry_codes = codes.into_iter().collect();
        self
    }

    /// Sets the reroute budget and its trigger codes.
    #[must_use]
    pub fn with_reroutes(mut self, max: u32, codes: impl IntoIterator<Item = u16>) -> Self {
        self.max_reroutes = max;
        self.reroute_codes = codes.into_iter().collect();
        self
    }
}

/// A completion webhook registered on a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Webhook {
    /// Delivery URL.
    pub url: String,
    /// Regions that deliver to this webhook, if restricted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regions: Option<BTreeSet<String>>,
    /// Whether this webhook counts toward the quorum.
    #[serde(default = "default_quorum_vote")]
    pub has_quorum_vote: bool,
}

fn default_quorum_vote() -> bool {
    true
}

impl Webhook {
    /// Creates a voting webhook.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            regions: None,
            has_quorum_vote: true,
        }
    }

    /// Restricts delivery to the given regions.
    #[must_use]
    pub fn with_regions(mut self, regions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.regions = Some(regions.into_iter().map(Into::into).collect());
        self
    }

    /// Excludes this webhook from the quorum.
    #[must_use]
    pub fn non_voting(mut self) -> Self {
        self.has_quorum_vote = false;
        self
    }
}

/// Stable identity of a step, preserved across clones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepId(Uuid);

impl StepId {
    /// Creates a fresh identity.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for StepId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

//! Fluent builder for step descriptors.

use super::types::{
    default_fallback_on_error, ExecutionMode, IdempotentStrategy, RegionPolicy, RetryPolicy,
    StepId, StepType, Target, Webhook, STATUS_TIMEOUT,
};
use super::validation;
use super::Step;
use crate::errors::ConstructionError;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// Default timeout for a FRUGAL step's local call.
pub const DEFAULT_LOCAL_TIMEOUT: Duration = Duration::from_secs(30);

/// Accumulates a step's configuration and edges.
///
/// Nothing is validated until [`StepBuilder::build`], so constraints that
/// depend on the whole tree (quorum, cycles) are checked once and every
/// violation is reported together.
///
/// ```rust,ignore
/// let step = StepBuilder::new()
///     .url("https://api.example.com/charge")
///     .method("POST")
///     .step_type(StepType::Frugal)
///     .fallback_on_error([429, 500])
///     .on_success(StepBuilder::new().url("https://api.example.com/notify"))
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct StepBuilder {
    pub(crate) id: StepId,
    pub(crate) name: Option<String>,
    pub(crate) step_type: StepType,
    pub(crate) target: Target,
    pub(crate) metadata: BTreeMap<String, serde_json::Value>,
    pub(crate) webhooks: Vec<Webhook>,
    pub(crate) webhook_quorum: Option<u32>,
    pub(crate) regions: Vec<String>,
    pub(crate) region_policy: RegionPolicy,
    pub(crate) execution_mode: ExecutionMode,
    pub(crate) retry_policy: Option<RetryPolicy>,
    pub(crate) retry_at: Option<i64>,
    pub(crate) idempotent_strategy: IdempotentStrategy,
    pub(crate) idempotent_key: Option<String>,
    pub(crate) fallback_on_error: BTreeSet<u16>,
    pub(crate) local_timeout: Duration,
    pub(crate) on_success: Option<Box<StepBuilder>>,
    pub(crate) on_failure: Option<Box<StepBuilder>>,
    pub(crate) fallback: Option<(Box<StepBuilder>, BTreeSet<u16>)>,
}

impl Default for StepBuilder {
    fn default() -> Self {
        Self {
            id: StepId::new(),
            name: None,
            step_type: StepType::default(),
            target: Target::new(""),
            metadata: BTreeMap::new(),
            webhooks: Vec::new(),
            webhook_quorum: None,
            regions: Vec::new(),
            region_policy: RegionPolicy::default(),
            execution_mode: ExecutionMode::default(),
            retry_policy: None,
            retry_at: None,
            idempotent_strategy: IdempotentStrategy::default(),
            idempotent_key: None,
            fallback_on_error: default_fallback_on_error(),
            local_timeout: DEFAULT_LOCAL_TIMEOUT,
            on_success: None,
            on_failure: None,
            fallback: None,
        }
    }
}

impl StepBuilder {
    /// Creates a PERFORMANCE GET step with no target yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns this step's identity.
    #[must_use]
    pub fn id(&self) -> StepId {
        self.id
    }

    /// Sets a label used in logs and traversal records.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the execution type.
    #[must_use]
    pub fn step_type(mut self, step_type: StepType) -> Self {
        self.step_type = step_type;
        self
    }

    /// Sets the target URL.
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.target.url = url.into();
        self
    }

    /// Sets the HTTP method (upper-cased).
    #[must_use]
    pub fn method(mut self, method: impl AsRef<str>) -> Self {
        self.target.method = method.as_ref().trim().to_uppercase();
        self
    }

    /// Adds a single request header.
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.target.headers.insert(key.into(), value.into());
        self
    }

    /// Replaces all request headers.
    #[must_use]
    pub fn headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
        self.target.headers = headers.into_iter().collect();
        self
    }

    /// Sets the raw request body.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.target.body = Some(body.into());
        self
    }

    /// Serializes a JSON body and sets the content type.
    #[must_use]
    pub fn json_body(self, body: &serde_json::Value) -> Self {
        self.header("Content-Type", "application/json")
            .body(body.to_string())
    }

    /// Adds a metadata entry passed through to completion payloads.
    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Appends a completion webhook.
    #[must_use]
    pub fn webhook(mut self, webhook: Webhook) -> Self {
        self.webhooks.push(webhook);
        self
    }

    /// Replaces the webhook list.
    #[must_use]
    pub fn webhooks(mut self, webhooks: Vec<Webhook>) -> Self {
        self.webhooks = webhooks;
        self
    }

    /// Sets the minimum number of voting webhooks that must succeed.
    #[must_use]
    pub fn webhook_quorum(mut self, quorum: u32) -> Self {
        self.webhook_quorum = Some(quorum);
        self
    }

    /// Sets the regions, keeping first-seen order and dropping duplicates.
    #[must_use]
    pub fn regions(mut self, regions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.regions.clear();
        for region in regions {
            let region = region.into();
            if !self.regions.contains(&region) {
                self.regions.push(region);
            }
        }
        self
    }

    /// Sets the region policy.
    #[must_use]
    pub fn region_policy(mut self, policy: RegionPolicy) -> Self {
        self.region_policy = policy;
        self
    }

    /// Sets the execution mode.
    #[must_use]
    pub fn execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = mode;
        self
    }

    /// Sets the retry policy forwarded to the backend.
    #[must_use]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Sets the earliest retry time (unix milliseconds).
    #[must_use]
    pub fn retry_at(mut self, timestamp_ms: i64) -> Self {
        self.retry_at = Some(timestamp_ms);
        self
    }

    /// Uses a caller-owned idempotency key (CUSTOM strategy).
    #[must_use]
    pub fn idempotent_key(mut self, key: impl Into<String>) -> Self {
        self.idempotent_key = Some(key.into());
        self.idempotent_strategy = IdempotentStrategy::Custom;
        self
    }

    /// Sets the idempotency strategy.
    #[must_use]
    pub fn idempotent_strategy(mut self, strategy: IdempotentStrategy) -> Self {
        self.idempotent_strategy = strategy;
        self
    }

    /// (FRUGAL) Sets the statuses that forward the request to the backend.
    #[must_use]
    pub fn fallback_on_error(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.fallback_on_error = codes.into_iter().collect();
        self
    }

    /// (FRUGAL) Sets the local call timeout.
    #[must_use]
    pub fn local_timeout(mut self, timeout: Duration) -> Self {
        self.local_timeout = timeout;
        self
    }

    /// Sets the step to run when this one succeeds. Replaces any earlier edge.
    #[must_use]
    pub fn on_success(mut self, step: Self) -> Self {
        self.on_success = Some(Box::new(step));
        self
    }

    /// Sets the step to run when this one fails. Replaces any earlier edge.
    #[must_use]
    pub fn on_failure(mut self, step: Self) -> Self {
        self.on_failure = Some(Box::new(step));
        self
    }

    /// Sets a fallback taken instead of the success/failure edges when the
    /// verdict status is in `trigger_on_error`. Replaces any earlier fallback.
    #[must_use]
    pub fn fallback(mut self, step: Self, trigger_on_error: impl IntoIterator<Item = u16>) -> Self {
        self.fallback = Some((Box::new(step), trigger_on_error.into_iter().collect()));
        self
    }

    /// Sets a fallback taken when the local call times out.
    #[must_use]
    pub fn fallback_on_timeout(self, step: Self) -> Self {
        self.fallback(step, [STATUS_TIMEOUT])
    }

    /// Validates the whole tree and freezes it into an immutable [`Step`].
    ///
    /// # Errors
    ///
    /// Returns every violated constraint found anywhere in the tree.
    pub fn build(&self) -> Result<Step, ConstructionError> {
        let violations = validation::validate(self);
        if !violations.is_empty() {
            return Err(ConstructionError::new(violations));
        }
        Ok(Step::freeze(self))
    }

    /// Label used when no explicit name was set.
    pub(crate) fn label(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{} {}", self.target.method, self.target.url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::codes;

    #[test]
    fn test_builder_defaults() {
        let builder = StepBuilder::new();

        assert_eq!(builder.step_type, StepType::Performance);
        assert_eq!(builder.target.method, "GET");
        assert_eq!(builder.idempotent_strategy, IdempotentStrategy::Hash);
        assert_eq!(builder.local_timeout, DEFAULT_LOCAL_TIMEOUT);
        assert!(builder.fallback_on_error.contains(&429));
    }

    #[test]
    fn test_method_is_uppercased() {
        let builder = StepBuilder::new().method("post");
        assert_eq!(builder.target.method, "POST");
    }

    #[test]
    fn test_custom_key_selects_custom_strategy() {
        let builder = StepBuilder::new().idempotent_key("order-1");

        assert_eq!(builder.idempotent_strategy, IdempotentStrategy::Custom);
        assert_eq!(builder.idempotent_key.as_deref(), Some("order-1"));
    }

    #[test]
    fn test_regions_keep_order_and_dedupe() {
        let builder = StepBuilder::new().regions(["iad", "lax", "iad", "ord"]);
        assert_eq!(builder.regions, vec!["iad", "lax", "ord"]);
    }

    #[test]
    fn test_edges_last_write_wins() {
        let first = StepBuilder::new().url("https://a.example.com").name("first");
        let second = StepBuilder::new().url("https://b.example.com").name("second");

        let step = StepBuilder::new()
            .url("https://root.example.com")
            .on_success(first.clone())
            .on_success(second.clone())
            .on_failure(first.clone())
            .on_failure(second)
            .fallback(first.clone(), [500])
            .fallback(first, [502])
            .build()
            .unwrap();

        assert_eq!(step.on_success().map(|s| s.name()), Some("second"));
        assert_eq!(step.on_failure().map(|s| s.name()), Some("second"));
        let fallback = step.fallback().unwrap();
        assert!(fallback.trigger_on_error.contains(&502));
        assert!(!fallback.trigger_on_error.contains(&500));
    }

    #[test]
    fn test_fallback_on_timeout_uses_synthetic_status() {
        let step = StepBuilder::new()
            .url("https://root.example.com")
            .fallback_on_timeout(StepBuilder::new().url("https://backup.example.com"))
            .build()
            .unwrap();

        let fallback = step.fallback().unwrap();
        assert!(fallback.trigger_on_error.contains(&STATUS_TIMEOUT));
    }

    #[test]
    fn test_build_reports_all_violations_at_once() {
        let err = StepBuilder::new()
            .idempotent_strategy(IdempotentStrategy::Custom)
            .webhook(Webhook::new("https://hook.example.com"))
            .webhook_quorum(2)
            .build()
            .unwrap_err();

        assert!(err.has_code(codes::EMPTY_URL));
        assert!(err.has_code(codes::CUSTOM_KEY));
        assert!(err.has_code(codes::QUORUM));
        assert_eq!(err.violations.len(), 3);
    }

    #[test]
    fn test_default_label() {
        let builder = StepBuilder::new().url("https://api.example.com").method("put");
        assert_eq!(builder.label(), "PUT https://api.example.com");
    }
}

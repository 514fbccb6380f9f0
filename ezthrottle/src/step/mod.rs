//! Step descriptors and the workflow graph they form.
//!
//! A [`StepBuilder`] is assembled fluently and frozen with
//! [`StepBuilder::build`] into a [`Step`]: an immutable node whose
//! `on_success`, `on_failure` and `fallback` edges point at further frozen
//! steps. Frozen trees can be shared freely between workflows because nothing
//! can mutate them.

mod builder;
mod types;
mod validation;

pub use builder::{StepBuilder, DEFAULT_LOCAL_TIMEOUT};
pub use types::{
    default_fallback_on_error, is_synthetic_status, ExecutionMode, IdempotentStrategy,
    RegionPolicy, RetryPolicy, StepId, StepType, Target, Webhook, STATUS_ACCEPTED,
    STATUS_TIMEOUT, STATUS_TRANSPORT_ERROR,
};

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

/// A fallback edge and the statuses that trigger it.
#[derive(Debug, Clone)]
pub struct FallbackEdge {
    /// The step substituted when the edge triggers.
    pub step: Arc<Step>,
    /// Verdict statuses that trigger the fallback.
    pub trigger_on_error: BTreeSet<u16>,
}

impl FallbackEdge {
    /// Returns true if the status triggers this fallback.
    #[must_use]
    pub fn triggers_on(&self, status: u16) -> bool {
        self.trigger_on_error.contains(&status)
    }
}

/// A validated, immutable step descriptor.
#[derive(Debug, Clone)]
pub struct Step {
    id: StepId,
    name: String,
    step_type: StepType,
    target: Target,
    metadata: BTreeMap<String, serde_json::Value>,
    webhooks: Vec<Webhook>,
    webhook_quorum: Option<u32>,
    regions: Vec<String>,
    region_policy: RegionPolicy,
    execution_mode: ExecutionMode,
    retry_policy: Option<RetryPolicy>,
    retry_at: Option<i64>,
    idempotent_strategy: IdempotentStrategy,
    idempotent_key: Option<String>,
    fallback_on_error: BTreeSet<u16>,
    local_timeout: Duration,
    on_success: Option<Arc<Step>>,
    on_failure: Option<Arc<Step>>,
    fallback: Option<FallbackEdge>,
}

impl Step {
    /// Starts a new builder.
    #[must_use]
    pub fn builder() -> StepBuilder {
        StepBuilder::new()
    }

    /// Freezes an already validated builder tree.
    pub(crate) fn freeze(builder: &StepBuilder) -> Self {
        Self {
            id: builder.id,
            name: builder.label(),
            step_type: builder.step_type,
            target: builder.target.clone(),
            metadata: builder.metadata.clone(),
            webhooks: builder.webhooks.clone(),
            webhook_quorum: builder.webhook_quorum,
            regions: builder.regions.clone(),
            region_policy: builder.region_policy,
            execution_mode: builder.execution_mode,
            retry_policy: builder.retry_policy.clone(),
            retry_at: builder.retry_at,
            idempotent_strategy: builder.idempotent_strategy,
            idempotent_key: builder.idempotent_key.clone(),
            fallback_on_error: builder.fallback_on_error.clone(),
            local_timeout: builder.local_timeout,
            on_success: builder.on_success.as_deref().map(|b| Arc::new(Self::freeze(b))),
            on_failure: builder.on_failure.as_deref().map(|b| Arc::new(Self::freeze(b))),
            fallback: builder.fallback.as_ref().map(|(child, triggers)| FallbackEdge {
                step: Arc::new(Self::freeze(child)),
                trigger_on_error: triggers.clone(),
            }),
        }
    }

    /// Returns the step identity.
    #[must_use]
    pub fn id(&self) -> StepId {
        self.id
    }

    /// Returns the step label.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the execution type.
    #[must_use]
    pub fn step_type(&self) -> StepType {
        self.step_type
    }

    /// Returns the HTTP call definition.
    #[must_use]
    pub fn target(&self) -> &Target {
        &self.target
    }

    /// Returns the pass-through metadata.
    #[must_use]
    pub fn metadata(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.metadata
    }

    /// Returns the completion webhooks.
    #[must_use]
    pub fn webhooks(&self) -> &[Webhook] {
        &self.webhooks
    }

    /// Returns the webhook quorum, if set.
    #[must_use]
    pub fn webhook_quorum(&self) -> Option<u32> {
        self.webhook_quorum
    }

    /// Returns the ordered regions.
    #[must_use]
    pub fn regions(&self) -> &[String] {
        &self.regions
    }

    /// Returns the region policy.
    #[must_use]
    pub fn region_policy(&self) -> RegionPolicy {
        self.region_policy
    }

    /// Returns the execution mode.
    #[must_use]
    pub fn execution_mode(&self) -> ExecutionMode {
        self.execution_mode
    }

    /// Returns the retry policy, if set.
    #[must_use]
    pub fn retry_policy(&self) -> Option<&RetryPolicy> {
        self.retry_policy.as_ref()
    }

    /// Returns the earliest retry time (unix milliseconds), if set.
    #[must_use]
    pub fn retry_at(&self) -> Option<i64> {
        self.retry_at
    }

    /// Returns the idempotency strategy.
    #[must_use]
    pub fn idempotent_strategy(&self) -> IdempotentStrategy {
        self.idempotent_strategy
    }

    /// Returns the custom idempotency key, if any.
    #[must_use]
    pub fn idempotent_key(&self) -> Option<&str> {
        self.idempotent_key.as_deref()
    }

    /// Returns the statuses that forward a FRUGAL step.
    #[must_use]
    pub fn fallback_on_error(&self) -> &BTreeSet<u16> {
        &self.fallback_on_error
    }

    /// Returns the local call timeout.
    #[must_use]
    pub fn local_timeout(&self) -> Duration {
        self.local_timeout
    }

    /// Returns the success edge.
    #[must_use]
    pub fn on_success(&self) -> Option<&Arc<Step>> {
        self.on_success.as_ref()
    }

    /// Returns the failure edge.
    #[must_use]
    pub fn on_failure(&self) -> Option<&Arc<Step>> {
        self.on_failure.as_ref()
    }

    /// Returns the fallback edge.
    #[must_use]
    pub fn fallback(&self) -> Option<&FallbackEdge> {
        self.fallback.as_ref()
    }

    /// Returns true if the step has no outgoing edges.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.on_success.is_none() && self.on_failure.is_none() && self.fallback.is_none()
    }

    /// Returns the number of steps in the tree rooted here.
    #[must_use]
    pub fn node_count(&self) -> usize {
        1 + self.on_success.as_ref().map_or(0, |s| s.node_count())
            + self.on_failure.as_ref().map_or(0, |s| s.node_count())
            + self.fallback.as_ref().map_or(0, |f| f.step.node_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_freeze_copies_configuration() {
        let step = Step::builder()
            .name("charge")
            .url("https://api.example.com/charge")
            .method("post")
            .body("{\"amount\":100}")
            .step_type(StepType::Frugal)
            .regions(["iad"])
            .metadata("order", "o-1")
            .build()
            .unwrap();

        assert_eq!(step.name(), "charge");
        assert_eq!(step.target().method, "POST");
        assert_eq!(step.step_type(), StepType::Frugal);
        assert_eq!(step.regions(), ["iad".to_string()]);
        assert_eq!(step.metadata().get("order"), Some(&serde_json::json!("o-1")));
        assert!(step.is_leaf());
    }

    #[test]
    fn test_node_count_and_shared_subtree() {
        let notify = Step::builder().url("https://notify.example.com");
        let step = Step::builder()
            .url("https://a.example.com")
            .on_success(notify.clone())
            .on_failure(notify)
            .fallback(Step::builder().url("https://b.example.com"), [500])
            .build()
            .unwrap();

        assert_eq!(step.node_count(), 4);
        assert!(step.fallback().unwrap().triggers_on(500));
        assert!(!step.fallback().unwrap().triggers_on(404));
    }

    #[test]
    fn test_builder_is_independent_of_frozen_step() {
        let builder = Step::builder().url("https://a.example.com");
        let frozen = builder.build().unwrap();

        let changed = builder.url("https://changed.example.com").build().unwrap();

        assert_eq!(frozen.target().url, "https://a.example.com");
        assert_eq!(changed.target().url, "https://changed.example.com");
        assert_eq!(frozen.id(), changed.id());
    }
}

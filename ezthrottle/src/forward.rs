//! Forwarding adapter for existing call sites.
//!
//! A legacy function that makes its own HTTP call can hand the request over
//! to the backend by returning [`Forwardable::ForwardRequested`] instead of a
//! value. [`AutoForwarder::run`] turns that request into a PERFORMANCE step and
//! executes it through the [`Engine`].

use crate::engine::{Engine, WorkflowResult};
use crate::errors::EzThrottleError;
use crate::step::{StepBuilder, StepType, Webhook};
use std::collections::BTreeMap;
use std::future::Future;

/// The request a callable wants the backend to run on its behalf.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ForwardRequest {
    /// Target URL.
    pub url: String,
    /// HTTP method.
    pub method: String,
    /// Request headers.
    pub headers: BTreeMap<String, String>,
    /// Request body.
    pub body: Option<String>,
    /// Metadata passed through to completion webhooks.
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Caller-owned idempotency key; HASH is used when absent.
    pub idempotent_key: Option<String>,
    /// Completion webhooks.
    pub webhooks: Vec<Webhook>,
    /// Preferred regions.
    pub regions: Vec<String>,
}

impl ForwardRequest {
    /// Creates a GET request for the URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: "GET".to_string(),
            ..Self::default()
        }
    }

    /// Sets the HTTP method.
    #[must_use]
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Sets a caller-owned idempotency key.
    #[must_use]
    pub fn with_idempotent_key(mut self, key: impl Into<String>) -> Self {
        self.idempotent_key = Some(key.into());
        self
    }

    /// Adds a completion webhook.
    #[must_use]
    pub fn with_webhook(mut self, webhook: Webhook) -> Self {
        self.webhooks.push(webhook);
        self
    }

    /// Sets the preferred regions.
    #[must_use]
    pub fn with_regions(mut self, regions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.regions = regions.into_iter().map(Into::into).collect();
        self
    }

    /// Builds the PERFORMANCE step that submits this request.
    #[must_use]
    pub fn into_step(self) -> StepBuilder {
        let mut step = StepBuilder::new()
            .step_type(StepType::Performance)
            .url(self.url)
            .method(self.method)
            .headers(self.headers)
            .webhooks(self.webhooks)
            .regions(self.regions);

        if let Some(body) = self.body {
            step = step.body(body);
        }
        if let Some(key) = self.idempotent_key {
            step = step.idempotent_key(key);
        }
        for (key, value) in self.metadata {
            step = step.metadata(key, value);
        }
        step
    }
}

/// What a wrapped callable returns.
#[derive(Debug, Clone, PartialEq)]
pub enum Forwardable<T> {
    /// The callable handled the work itself.
    Completed(T),
    /// The callable asks for the request to be run by the backend.
    ForwardRequested(ForwardRequest),
}

/// Result of an auto-forwarded call.
#[derive(Debug, Clone)]
pub enum AutoForwardOutcome<T> {
    /// The callable's own value.
    Direct(T),
    /// The workflow run for the forwarded request.
    Forwarded(WorkflowResult),
}

impl<T> AutoForwardOutcome<T> {
    /// Returns true if the request went to the backend.
    #[must_use]
    pub fn is_forwarded(&self) -> bool {
        matches!(self, Self::Forwarded(_))
    }
}

/// Wraps callables so that forward requests and errors reach the backend.
#[derive(Debug, Clone)]
pub struct AutoForwarder {
    engine: Engine,
    default_request: Option<ForwardRequest>,
}

impl AutoForwarder {
    /// Creates a forwarder without a default request.
    #[must_use]
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            default_request: None,
        }
    }

    /// Sets the request forwarded when the callable returns an error.
    ///
    /// The error text is added to its metadata under `"error"`.
    #[must_use]
    pub fn with_default_request(mut self, request: ForwardRequest) -> Self {
        self.default_request = Some(request);
        self
    }

    /// Runs the callable and forwards if it asks to or fails.
    ///
    /// # Errors
    ///
    /// Returns [`EzThrottleError::Transport`] when the callable fails and no
    /// default request is configured, and [`EzThrottleError::Construction`]
    /// when the forward request does not form a valid step.
    pub async fn run<T, E, F, Fut>(&self, f: F) -> Result<AutoForwardOutcome<T>, EzThrottleError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Forwardable<T>, E>>,
        E: std::fmt::Display,
    {
        match f().await {
            Ok(Forwardable::Completed(value)) => Ok(AutoForwardOutcome::Direct(value)),
            Ok(Forwardable::ForwardRequested(request)) => self.forward(request).await,
            Err(err) => {
                let Some(request) = self.default_request.clone() else {
                    return Err(EzThrottleError::Transport(err.to_string()));
                };
                tracing::warn!(error = %err, url = %request.url, "Call failed, forwarding default request");
                self.forward(request.with_metadata("error", err.to_string()))
                    .await
            }
        }
    }

    async fn forward<T>(
        &self,
        request: ForwardRequest,
    ) -> Result<AutoForwardOutcome<T>, EzThrottleError> {
        tracing::info!(url = %request.url, method = %request.method, "Forwarding request");
        let result = self.engine.execute(&request.into_step()).await?;
        Ok(AutoForwardOutcome::Forwarded(result))
    }
}

/// Runs `f` through an [`AutoForwarder`] with no default request.
///
/// # Errors
///
/// See [`AutoForwarder::run`].
pub async fn auto_forward<T, E, F, Fut>(
    engine: &Engine,
    f: F,
) -> Result<AutoForwardOutcome<T>, EzThrottleError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Forwardable<T>, E>>,
    E: std::fmt::Display,
{
    AutoForwarder::new(engine.clone()).run(f).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::NodeOutcome;
    use crate::testing::MockTransport;
    use std::sync::Arc;

    const URL: &str = "https://api.example.com/charge";

    fn setup() -> (Arc<MockTransport>, Engine) {
        let transport = Arc::new(MockTransport::new());
        let engine = Engine::new(transport.clone()).with_customer_id("cust");
        (transport, engine)
    }

    #[tokio::test]
    async fn test_completed_value_is_returned_directly() {
        let (transport, engine) = setup();

        let outcome = auto_forward(&engine, || async { Ok::<_, String>(Forwardable::Completed(42)) })
            .await
            .unwrap();

        assert!(matches!(outcome, AutoForwardOutcome::Direct(42)));
        assert!(transport.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_forward_request_is_submitted() {
        let (transport, engine) = setup();

        let outcome = auto_forward(&engine, || async {
            Ok::<Forwardable<()>, String>(Forwardable::ForwardRequested(
                ForwardRequest::new(URL)
                    .with_method("post")
                    .with_body("{\"amount\":5}")
                    .with_idempotent_key("order-5")
                    .with_metadata("source", "legacy"),
            ))
        })
        .await
        .unwrap();

        let AutoForwardOutcome::Forwarded(result) = outcome else {
            panic!("expected forwarding");
        };
        assert!(matches!(result.outcome(), NodeOutcome::Accepted(_)));

        let jobs = transport.submissions();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].method, "POST");
        assert_eq!(jobs[0].idempotent_key, "order-5");
        assert_eq!(jobs[0].metadata.get("source"), Some(&serde_json::json!("legacy")));
        assert!(transport.local_calls().is_empty());
    }

    #[tokio::test]
    async fn test_error_without_default_is_transport_error() {
        let (transport, engine) = setup();

        let err = auto_forward(&engine, || async {
            Err::<Forwardable<()>, _>("connection reset")
        })
        .await
        .unwrap_err();

        assert!(matches!(err, EzThrottleError::Transport(ref m) if m == "connection reset"));
        assert!(transport.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_error_with_default_forwards_and_records_error() {
        let (transport, engine) = setup();
        let forwarder = AutoForwarder::new(engine).with_default_request(ForwardRequest::new(URL));

        let outcome = forwarder
            .run(|| async { Err::<Forwardable<()>, _>("timed out") })
            .await
            .unwrap();

        assert!(outcome.is_forwarded());
        let jobs = transport.submissions();
        assert_eq!(jobs[0].metadata.get("error"), Some(&serde_json::json!("timed out")));
    }

    #[tokio::test]
    async fn test_invalid_forward_request_is_construction_error() {
        let (_, engine) = setup();

        let err = auto_forward(&engine, || async {
            Ok::<Forwardable<()>, String>(Forwardable::ForwardRequested(ForwardRequest::new("")))
        })
        .await
        .unwrap_err();

        assert!(matches!(err, EzThrottleError::Construction(_)));
    }
}

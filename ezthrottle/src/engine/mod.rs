//! Workflow execution engine.
//!
//! The engine walks a frozen [`Step`] tree one node at a time. Each node is
//! either submitted to the backend (PERFORMANCE) or called locally and
//! forwarded on selected statuses (FRUGAL). The node's [`Verdict`] then picks
//! the next edge: a matching fallback first, otherwise `on_success` or
//! `on_failure`. The traversal ends at the first node with no applicable edge.

mod result;
mod transport;

pub use result::{EdgeKind, ExecutionState, NodeOutcome, StepVisit, Verdict, WorkflowResult};
pub use transport::{
    JobRequest, JobSubmission, LocalResponse, SubmitError, Transport, TransportError,
};

use crate::cancellation::CancellationToken;
use crate::errors::EzThrottleError;
use crate::events::{self, EventSink, NoOpEventSink};
use crate::idempotency;
use crate::observability;
use crate::step::{Step, StepBuilder, StepType, STATUS_ACCEPTED};
use serde_json::json;
use std::sync::Arc;
use tracing::Instrument;

/// Drives workflow traversals against a [`Transport`].
///
/// The engine holds no per-run state and is cheap to clone, so a single
/// instance can run any number of workflows concurrently.
#[derive(Clone)]
pub struct Engine {
    transport: Arc<dyn Transport>,
    customer_id: String,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("customer_id", &self.customer_id)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Creates an engine for the given transport.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            customer_id: String::new(),
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the customer id mixed into HASH idempotency keys.
    #[must_use]
    pub fn with_customer_id(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = customer_id.into();
        self
    }

    /// Sets the sink receiving lifecycle events.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Returns the customer id.
    #[must_use]
    pub fn customer_id(&self) -> &str {
        &self.customer_id
    }

    /// Validates and runs a workflow.
    ///
    /// # Errors
    ///
    /// Returns [`EzThrottleError::Construction`] before any network call if
    /// the tree is invalid.
    pub async fn execute(&self, root: &StepBuilder) -> Result<WorkflowResult, EzThrottleError> {
        let step = root.build()?;
        self.execute_step(&step).await
    }

    /// Runs an already frozen workflow.
    ///
    /// Local failures and backend rejections are not errors here: they are
    /// verdicts that route through the tree, and the terminal one is reported
    /// in the returned [`WorkflowResult`].
    ///
    /// # Errors
    ///
    /// Never fails without a cancellation token; the `Result` keeps the
    /// signature aligned with [`Self::execute`] and
    /// [`Self::execute_with_cancel`].
    pub async fn execute_step(&self, root: &Step) -> Result<WorkflowResult, EzThrottleError> {
        self.run(root, None).await
    }

    /// Runs a workflow, stopping before the next step once `token` is
    /// cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`EzThrottleError::Cancelled`] with the token's reason.
    pub async fn execute_with_cancel(
        &self,
        root: &Step,
        token: &CancellationToken,
    ) -> Result<WorkflowResult, EzThrottleError> {
        self.run(root, Some(token)).await
    }

    async fn run(
        &self,
        root: &Step,
        cancel: Option<&CancellationToken>,
    ) -> Result<WorkflowResult, EzThrottleError> {
        let mut path = Vec::new();
        let mut current = root;

        loop {
            if let Some(token) = cancel.filter(|t| t.is_cancelled()) {
                let reason = token.reason().unwrap_or_default();
                tracing::info!(step = %current.name(), reason = %reason, "Workflow cancelled");
                self.events
                    .emit(
                        events::WORKFLOW_CANCELLED,
                        Some(json!({"next_step": current.name(), "reason": reason})),
                    )
                    .await;
                return Err(EzThrottleError::Cancelled(reason));
            }

            let mut visit = self
                .visit(current)
                .instrument(observability::step_span(current))
                .await;

            let Some((edge, next)) = select_edge(current, visit.verdict) else {
                tracing::debug!(
                    step = %visit.step_name,
                    status = visit.verdict.status,
                    success = visit.verdict.success,
                    visited = path.len() + 1,
                    "Workflow completed"
                );
                self.events
                    .emit(
                        events::WORKFLOW_COMPLETED,
                        Some(json!({
                            "step": visit.step_name,
                            "success": visit.verdict.success,
                            "status": visit.verdict.status,
                            "visited": path.len() + 1,
                        })),
                    )
                    .await;
                return Ok(WorkflowResult::new(path, visit));
            };

            tracing::debug!(from = %current.name(), to = %next.name(), edge = %edge, "Following edge");
            self.events
                .emit(
                    events::WORKFLOW_EDGE,
                    Some(json!({
                        "from": current.name(),
                        "to": next.name(),
                        "edge": edge.to_string(),
                        "status": visit.verdict.status,
                    })),
                )
                .await;

            visit.edge = Some(edge);
            path.push(visit);
            current = next;
        }
    }

    async fn visit(&self, step: &Step) -> StepVisit {
        let key = idempotency::resolve(step, &self.customer_id);
        let mut states = vec![ExecutionState::Pending];

        self.events
            .emit(
                events::STEP_STARTED,
                Some(json!({
                    "step": step.name(),
                    "step_type": step.step_type().to_string(),
                    "idempotency_key": key,
                })),
            )
            .await;

        let (verdict, outcome) = match step.step_type() {
            StepType::Performance => {
                states.push(ExecutionState::RemoteSubmit);
                self.submit(step, &key).await
            }
            StepType::Frugal => {
                states.push(ExecutionState::LocalAttempt);
                let local = self.call_local(step).await;
                let status = match &local {
                    Ok(response) => response.status,
                    Err(err) => err.synthetic_status(),
                };

                let fallback_matches = step.fallback().is_some_and(|f| f.triggers_on(status));
                if step.fallback_on_error().contains(&status) && !fallback_matches {
                    states.push(ExecutionState::RemoteForward);
                    tracing::info!(step = %step.name(), status, "Forwarding to backend");
                    self.events
                        .emit(
                            events::STEP_FORWARDED,
                            Some(json!({"step": step.name(), "status": status})),
                        )
                        .await;
                    self.submit(step, &key).await
                } else {
                    match local {
                        Ok(response) => {
                            let verdict = if response.is_success() {
                                Verdict::success(status)
                            } else {
                                Verdict::failure(status)
                            };
                            (verdict, NodeOutcome::Local(response))
                        }
                        Err(err) => (
                            Verdict::failure(status),
                            NodeOutcome::LocalFailed {
                                status,
                                message: err.to_string(),
                            },
                        ),
                    }
                }
            }
        };

        states.push(if verdict.success {
            ExecutionState::Completed
        } else {
            ExecutionState::Failed
        });

        let event = if verdict.success {
            events::STEP_COMPLETED
        } else {
            events::STEP_FAILED
        };
        self.events
            .emit(
                event,
                Some(json!({
                    "step": step.name(),
                    "status": verdict.status,
                    "forwarded": states.contains(&ExecutionState::RemoteForward),
                })),
            )
            .await;

        StepVisit {
            step_id: step.id(),
            step_name: step.name().to_string(),
            step_type: step.step_type(),
            idempotency_key: key,
            states,
            verdict,
            outcome,
            edge: None,
        }
    }

    async fn call_local(&self, step: &Step) -> Result<LocalResponse, TransportError> {
        let timeout = step.local_timeout();
        match tokio::time::timeout(timeout, self.transport.send(step.target(), timeout)).await {
            Ok(result) => result,
            Err(_) => {
                let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
                tracing::warn!(step = %step.name(), timeout_ms, "Local call timed out");
                Err(TransportError::Timeout(timeout))
            }
        }
    }

    async fn submit(&self, step: &Step, key: &str) -> (Verdict, NodeOutcome) {
        let job = JobRequest::from_step(step, key);
        match self.transport.submit_job(&job).await {
            Ok(submission) => {
                tracing::info!(step = %step.name(), job_id = %submission.job_id, "Job accepted");
                (Verdict::success(STATUS_ACCEPTED), NodeOutcome::Accepted(submission))
            }
            Err(err) => {
                tracing::warn!(step = %step.name(), status = err.status(), error = %err, "Job submission failed");
                (Verdict::failure(err.status()), NodeOutcome::Rejected(err.into_rejection()))
            }
        }
    }
}

/// Picks the edge to follow out of `step` for `verdict`.
///
/// A fallback whose trigger set contains the verdict status takes priority
/// over both `on_success` and `on_failure`.
pub fn select_edge(step: &Step, verdict: Verdict) -> Option<(EdgeKind, &Step)> {
    if let Some(fallback) = step.fallback().filter(|f| f.triggers_on(verdict.status)) {
        return Some((EdgeKind::Fallback, fallback.step.as_ref()));
    }
    if verdict.success {
        step.on_success().map(|s| (EdgeKind::OnSuccess, s.as_ref()))
    } else {
        step.on_failure().map(|s| (EdgeKind::OnFailure, s.as_ref()))
    }
}

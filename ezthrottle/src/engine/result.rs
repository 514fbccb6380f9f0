//! Traversal records and the final workflow result.

use super::transport::{JobSubmission, LocalResponse};
use crate::errors::{EzThrottleError, LocalExecutionFailure, RemoteRejection};
use crate::step::{StepId, StepType};
use serde::Serialize;

/// Per-node execution state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// Key resolved, no call made yet.
    Pending,
    /// FRUGAL local call in progress.
    LocalAttempt,
    /// FRUGAL step forwarded to the backend.
    RemoteForward,
    /// PERFORMANCE step submitted to the backend.
    RemoteSubmit,
    /// Verdict was a success.
    Completed,
    /// Verdict was a failure.
    Failed,
}

/// The kind of edge followed out of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Fallback edge triggered by the verdict status.
    Fallback,
    /// Success edge.
    OnSuccess,
    /// Failure edge.
    OnFailure,
}

impl std::fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fallback => write!(f, "fallback"),
            Self::OnSuccess => write!(f, "on_success"),
            Self::OnFailure => write!(f, "on_failure"),
        }
    }
}

/// Success flag and status of a node, used for edge selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Verdict {
    /// Whether the node succeeded.
    pub success: bool,
    /// HTTP status, backend status, or a synthetic transport status.
    pub status: u16,
}

impl Verdict {
    /// A successful verdict.
    #[must_use]
    pub const fn success(status: u16) -> Self {
        Self {
            success: true,
            status,
        }
    }

    /// A failing verdict.
    #[must_use]
    pub const fn failure(status: u16) -> Self {
        Self {
            success: false,
            status,
        }
    }
}

/// The raw result of a single node.
#[derive(Debug, Clone)]
pub enum NodeOutcome {
    /// A FRUGAL local call that returned a response.
    Local(LocalResponse),
    /// A FRUGAL local call that never got a response.
    LocalFailed {
        /// Synthetic status.
        status: u16,
        /// Transport error details.
        message: String,
    },
    /// The backend accepted the job.
    Accepted(JobSubmission),
    /// The backend or the submission transport declined the job.
    Rejected(RemoteRejection),
}

/// Record of one visited node.
#[derive(Debug, Clone)]
pub struct StepVisit {
    /// Identity of the visited step.
    pub step_id: StepId,
    /// Label of the visited step.
    pub step_name: String,
    /// Execution type of the visited step.
    pub step_type: StepType,
    /// Resolved idempotency key.
    pub idempotency_key: String,
    /// States passed through, in order.
    pub states: Vec<ExecutionState>,
    /// The node's verdict.
    pub verdict: Verdict,
    /// The node's raw result.
    pub outcome: NodeOutcome,
    /// Edge followed out of this node, or `None` for the terminal node.
    pub edge: Option<EdgeKind>,
}

impl StepVisit {
    /// Returns the final state of the node.
    #[must_use]
    pub fn final_state(&self) -> ExecutionState {
        if self.verdict.success {
            ExecutionState::Completed
        } else {
            ExecutionState::Failed
        }
    }

    /// Returns true if the local outcome was forwarded to the backend.
    #[must_use]
    pub fn was_forwarded(&self) -> bool {
        self.states.contains(&ExecutionState::RemoteForward)
    }

    /// Returns true if a local HTTP call was made for this node.
    #[must_use]
    pub fn made_local_call(&self) -> bool {
        self.states.contains(&ExecutionState::LocalAttempt)
    }

    /// Returns true if a job submission was made for this node.
    #[must_use]
    pub fn made_submission(&self) -> bool {
        self.was_forwarded() || self.states.contains(&ExecutionState::RemoteSubmit)
    }
}

/// Outcome of a workflow traversal.
///
/// The terminal node's verdict and outcome are the workflow's; earlier nodes
/// are kept in visit order for inspection.
#[derive(Debug, Clone)]
pub struct WorkflowResult {
    path: Vec<StepVisit>,
    terminal: StepVisit,
}

impl WorkflowResult {
    pub(crate) fn new(path: Vec<StepVisit>, terminal: StepVisit) -> Self {
        Self { path, terminal }
    }

    /// Returns all visited nodes in order, terminal last.
    pub fn visits(&self) -> impl Iterator<Item = &StepVisit> {
        self.path.iter().chain(std::iter::once(&self.terminal))
    }

    /// Returns the number of visited nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.path.len() + 1
    }

    /// Always false: a traversal visits at least the root.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Returns the terminal node.
    #[must_use]
    pub fn terminal(&self) -> &StepVisit {
        &self.terminal
    }

    /// Returns the final verdict.
    #[must_use]
    pub fn verdict(&self) -> Verdict {
        self.terminal.verdict
    }

    /// Returns true if the final verdict is a success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.terminal.verdict.success
    }

    /// Returns the final state.
    #[must_use]
    pub fn state(&self) -> ExecutionState {
        self.terminal.final_state()
    }

    /// Returns the terminal node's raw result.
    #[must_use]
    pub fn outcome(&self) -> &NodeOutcome {
        &self.terminal.outcome
    }

    /// Returns the job id if the terminal node was accepted by the backend.
    #[must_use]
    pub fn job_id(&self) -> Option<&str> {
        match &self.terminal.outcome {
            NodeOutcome::Accepted(submission) => Some(&submission.job_id),
            _ => None,
        }
    }

    /// Returns the visited step labels in order.
    #[must_use]
    pub fn step_names(&self) -> Vec<&str> {
        self.visits().map(|v| v.step_name.as_str()).collect()
    }

    /// Returns the number of local HTTP calls made.
    #[must_use]
    pub fn local_call_count(&self) -> usize {
        self.visits().filter(|v| v.made_local_call()).count()
    }

    /// Returns the number of job submissions made.
    #[must_use]
    pub fn submission_count(&self) -> usize {
        self.visits().filter(|v| v.made_submission()).count()
    }

    /// Converts the result into the terminal outcome, or the error that
    /// describes a failing terminal verdict.
    ///
    /// # Errors
    ///
    /// Returns [`EzThrottleError::LocalExecution`] for a failed local call and
    /// [`EzThrottleError::RemoteRejection`] for a declined submission.
    pub fn into_outcome(self) -> Result<NodeOutcome, EzThrottleError> {
        let StepVisit {
            step_name,
            verdict,
            outcome,
            ..
        } = self.terminal;

        if verdict.success {
            return Ok(outcome);
        }

        match outcome {
            NodeOutcome::Local(response) => Err(LocalExecutionFailure::new(
                step_name,
                response.status,
                response.body,
            )
            .into()),
            NodeOutcome::LocalFailed { status, message } => {
                Err(LocalExecutionFailure::new(step_name, status, message).into())
            }
            NodeOutcome::Rejected(rejection) => Err(rejection.into()),
            accepted @ NodeOutcome::Accepted(_) => Ok(accepted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visit(name: &str, verdict: Verdict, outcome: NodeOutcome) -> StepVisit {
        StepVisit {
            step_id: StepId::new(),
            step_name: name.to_string(),
            step_type: StepType::Frugal,
            idempotency_key: "idem:0".to_string(),
            states: vec![ExecutionState::Pending, ExecutionState::LocalAttempt],
            verdict,
            outcome,
            edge: None,
        }
    }

    #[test]
    fn test_result_accessors() {
        let mut first = visit(
            "a",
            Verdict::failure(500),
            NodeOutcome::Local(LocalResponse::new(500, "boom")),
        );
        first.edge = Some(EdgeKind::Fallback);
        let last = visit(
            "b",
            Verdict::success(200),
            NodeOutcome::Local(LocalResponse::new(200, "ok")),
        );

        let result = WorkflowResult::new(vec![first], last);

        assert_eq!(result.len(), 2);
        assert_eq!(result.step_names(), vec!["a", "b"]);
        assert!(result.is_success());
        assert_eq!(result.state(), ExecutionState::Completed);
        assert_eq!(result.local_call_count(), 2);
        assert!(result.job_id().is_none());
    }

    #[test]
    fn test_into_outcome_local_failure() {
        let result = WorkflowResult::new(
            Vec::new(),
            visit(
                "charge",
                Verdict::failure(404),
                NodeOutcome::Local(LocalResponse::new(404, "missing")),
            ),
        );

        match result.into_outcome() {
            Err(EzThrottleError::LocalExecution(failure)) => {
                assert_eq!(failure.step, "charge");
                assert_eq!(failure.status, 404);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_into_outcome_rejection() {
        let result = WorkflowResult::new(
            Vec::new(),
            visit(
                "submit",
                Verdict::failure(429),
                NodeOutcome::Rejected(RemoteRejection::new(429, "rate limited")),
            ),
        );

        assert!(matches!(
            result.into_outcome(),
            Err(EzThrottleError::RemoteRejection(r)) if r.is_rate_limited()
        ));
    }

    #[test]
    fn test_edge_kind_display() {
        assert_eq!(EdgeKind::Fallback.to_string(), "fallback");
        assert_eq!(EdgeKind::OnSuccess.to_string(), "on_success");
        assert_eq!(EdgeKind::OnFailure.to_string(), "on_failure");
    }
}

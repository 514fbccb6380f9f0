//! Workflow lifecycle events.
//!
//! The engine reports each step transition to an [`EventSink`]. Sinks are
//! passed explicitly to the engine; there is no process-wide sink.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// A step is about to run.
pub const STEP_STARTED: &str = "step.started";
/// A FRUGAL step's local outcome triggered forwarding to the backend.
pub const STEP_FORWARDED: &str = "step.forwarded";
/// A step produced a successful verdict.
pub const STEP_COMPLETED: &str = "step.completed";
/// A step produced a failing verdict.
pub const STEP_FAILED: &str = "step.failed";
/// The engine followed an edge to another step.
pub const WORKFLOW_EDGE: &str = "workflow.edge";
/// A traversal reached a step with no applicable edge.
pub const WORKFLOW_COMPLETED: &str = "workflow.completed";
/// A traversal was stopped by its cancellation token.
pub const WORKFLOW_CANCELLED: &str = "workflow.cancelled";

//! Per-job continuations triggered by verified webhooks.

use super::payload::{JobStatus, WebhookPayload};
use dashmap::DashMap;
use std::collections::BTreeMap;

/// A handler run with the delivery that completed its job.
pub type ContinuationHandler = Box<dyn FnOnce(&WebhookPayload) + Send + Sync>;

struct Continuation {
    on_success: Option<ContinuationHandler>,
    on_failure: Option<ContinuationHandler>,
    metadata: BTreeMap<String, serde_json::Value>,
}

/// What happened when a delivery was dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A handler for the job's status ran to completion.
    Handled,
    /// The job was registered but had no handler for this status.
    NoHandler,
    /// The handler panicked; the continuation is still consumed.
    HandlerPanicked,
    /// Nothing was registered for the job.
    Unknown,
}

/// Thread-safe map from job id to the continuation waiting on it.
///
/// Each continuation runs at most once: dispatch removes it before invoking
/// the handler, so a redelivered webhook finds nothing.
#[derive(Default)]
pub struct ContinuationRegistry {
    pending: DashMap<String, Continuation>,
}

impl ContinuationRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers handlers for a job, replacing any earlier registration.
    pub fn register(
        &self,
        job_id: impl Into<String>,
        on_success: Option<ContinuationHandler>,
        on_failure: Option<ContinuationHandler>,
        metadata: BTreeMap<String, serde_json::Value>,
    ) {
        self.pending.insert(
            job_id.into(),
            Continuation {
                on_success,
                on_failure,
                metadata,
            },
        );
    }

    /// Runs the handler matching the delivery's status.
    pub fn dispatch(&self, payload: &WebhookPayload) -> DispatchOutcome {
        let Some((_, continuation)) = self.pending.remove(&payload.job_id) else {
            tracing::debug!(job_id = %payload.job_id, "No continuation registered");
            return DispatchOutcome::Unknown;
        };

        let handler = match payload.status {
            JobStatus::Success => continuation.on_success,
            JobStatus::Failed => continuation.on_failure,
        };
        let Some(handler) = handler else {
            return DispatchOutcome::NoHandler;
        };

        match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler(payload))) {
            Ok(()) => DispatchOutcome::Handled,
            Err(e) => {
                tracing::error!(job_id = %payload.job_id, "Continuation handler panicked: {:?}", e);
                DispatchOutcome::HandlerPanicked
            }
        }
    }

    /// Returns the metadata registered for a job.
    #[must_use]
    pub fn metadata(&self, job_id: &str) -> Option<BTreeMap<String, serde_json::Value>> {
        self.pending.get(job_id).map(|c| c.metadata.clone())
    }

    /// Returns true if a continuation is waiting on the job.
    #[must_use]
    pub fn contains(&self, job_id: &str) -> bool {
        self.pending.contains_key(job_id)
    }

    /// Drops the continuation for a job. Returns true if one existed.
    pub fn remove(&self, job_id: &str) -> bool {
        self.pending.remove(job_id).is_some()
    }

    /// Returns the number of waiting continuations.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drops every continuation.
    pub fn clear(&self) {
        self.pending.clear();
    }
}

impl std::fmt::Debug for ContinuationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContinuationRegistry")
            .field("pending", &self.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn payload(job_id: &str, status: JobStatus) -> WebhookPayload {
        WebhookPayload {
            job_id: job_id.to_string(),
            idempotent_key: None,
            status,
            response: None,
            metadata: BTreeMap::new(),
        }
    }

    fn counter_handler(counter: &Arc<AtomicUsize>) -> Option<ContinuationHandler> {
        let counter = counter.clone();
        let handler: ContinuationHandler = Box::new(move |_: &WebhookPayload| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        Some(handler)
    }

    #[test]
    fn test_dispatch_runs_matching_handler_once() {
        let registry = ContinuationRegistry::new();
        let success = Arc::new(AtomicUsize::new(0));
        let failure = Arc::new(AtomicUsize::new(0));
        registry.register(
            "job-1",
            counter_handler(&success),
            counter_handler(&failure),
            BTreeMap::new(),
        );

        let delivery = payload("job-1", JobStatus::Success);
        assert_eq!(registry.dispatch(&delivery), DispatchOutcome::Handled);
        assert_eq!(registry.dispatch(&delivery), DispatchOutcome::Unknown);

        assert_eq!(success.load(Ordering::SeqCst), 1);
        assert_eq!(failure.load(Ordering::SeqCst), 0);
        assert_eq!(registry.pending_count(), 0);
    }

    #[test]
    fn test_failure_without_handler_consumes_entry() {
        let registry = ContinuationRegistry::new();
        let success = Arc::new(AtomicUsize::new(0));
        registry.register("job-2", counter_handler(&success), None, BTreeMap::new());

        assert_eq!(
            registry.dispatch(&payload("job-2", JobStatus::Failed)),
            DispatchOutcome::NoHandler
        );
        assert!(!registry.contains("job-2"));
    }

    #[test]
    fn test_panicking_handler_is_contained() {
        let registry = ContinuationRegistry::new();
        let handler: ContinuationHandler = Box::new(|_: &WebhookPayload| panic!("handler bug"));
        registry.register("job-3", Some(handler), None, BTreeMap::new());

        assert_eq!(
            registry.dispatch(&payload("job-3", JobStatus::Success)),
            DispatchOutcome::HandlerPanicked
        );
        assert_eq!(registry.pending_count(), 0);
    }

    #[test]
    fn test_metadata_remove_and_clear() {
        let registry = ContinuationRegistry::new();
        let mut metadata = BTreeMap::new();
        metadata.insert("step".to_string(), serde_json::json!("notify"));
        registry.register("a", None, None, metadata);
        registry.register("b", None, None, BTreeMap::new());

        assert_eq!(
            registry.metadata("a").and_then(|m| m.get("step").cloned()),
            Some(serde_json::json!("notify"))
        );
        assert!(registry.remove("a"));
        assert!(!registry.remove("a"));

        registry.clear();
        assert_eq!(registry.pending_count(), 0);
    }

    #[test]
    fn test_concurrent_dispatch_runs_once() {
        let registry = Arc::new(ContinuationRegistry::new());
        let hits = Arc::new(AtomicUsize::new(0));
        registry.register("job-x", counter_handler(&hits), None, BTreeMap::new());

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                std::thread::spawn(move || registry.dispatch(&payload("job-x", JobStatus::Success)))
            })
            .collect();
        let handled = threads
            .into_iter()
            .map(|t| t.join().unwrap())
            .filter(|o| *o == DispatchOutcome::Handled)
            .count();

        assert_eq!(handled, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}

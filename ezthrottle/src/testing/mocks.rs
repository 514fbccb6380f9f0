//! Scripted transport for exercising workflows without a network.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;

use crate::engine::{JobRequest, JobSubmission, LocalResponse, SubmitError, Transport, TransportError};
use crate::errors::RemoteRejection;
use crate::step::Target;

#[derive(Debug, Clone)]
enum Scripted {
    Response(LocalResponse),
    Error(TransportError),
}

/// A transport that answers from a per-URL script and records every call.
///
/// Unscripted URLs answer `200 "ok"` locally. Job submissions are accepted
/// with sequential ids (`job-1`, `job-2`, ...) unless a rejection is
/// scripted for the job's target URL.
#[derive(Debug, Default)]
pub struct MockTransport {
    local: Mutex<HashMap<String, Scripted>>,
    delays: Mutex<HashMap<String, Duration>>,
    rejections: Mutex<HashMap<String, SubmitError>>,
    local_calls: Mutex<Vec<Target>>,
    submissions: Mutex<Vec<JobRequest>>,
}

impl MockTransport {
    /// Creates a transport with no script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the local response for a URL.
    #[must_use]
    pub fn respond(self, url: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        self.local
            .lock()
            .insert(url.into(), Scripted::Response(LocalResponse::new(status, body)));
        self
    }

    /// Scripts a transport failure for local calls to a URL.
    #[must_use]
    pub fn fail(self, url: impl Into<String>, error: TransportError) -> Self {
        self.local.lock().insert(url.into(), Scripted::Error(error));
        self
    }

    /// Delays local calls to a URL.
    #[must_use]
    pub fn delay(self, url: impl Into<String>, delay: Duration) -> Self {
        self.delays.lock().insert(url.into(), delay);
        self
    }

    /// Rejects job submissions whose target is the URL.
    #[must_use]
    pub fn reject_jobs(self, url: impl Into<String>, rejection: RemoteRejection) -> Self {
        self.rejections
            .lock()
            .insert(url.into(), SubmitError::Rejected(rejection));
        self
    }

    /// Fails job submissions whose target is the URL at the transport level.
    #[must_use]
    pub fn lose_jobs(self, url: impl Into<String>, error: TransportError) -> Self {
        self.rejections
            .lock()
            .insert(url.into(), SubmitError::Transport(error));
        self
    }

    /// Returns the local calls made, in order.
    #[must_use]
    pub fn local_calls(&self) -> Vec<Target> {
        self.local_calls.lock().clone()
    }

    /// Returns the number of local calls made to a URL.
    #[must_use]
    pub fn local_calls_to(&self, url: &str) -> usize {
        self.local_calls.lock().iter().filter(|t| t.url == url).count()
    }

    /// Returns the job submissions made, in order.
    #[must_use]
    pub fn submissions(&self) -> Vec<JobRequest> {
        self.submissions.lock().clone()
    }

    /// Returns the number of submissions targeting a URL.
    #[must_use]
    pub fn submissions_for(&self, url: &str) -> usize {
        self.submissions.lock().iter().filter(|j| j.url == url).count()
    }

    /// Clears recorded calls, keeping the script.
    pub fn reset(&self) {
        self.local_calls.lock().clear();
        self.submissions.lock().clear();
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(
        &self,
        target: &Target,
        _timeout: Duration,
    ) -> Result<LocalResponse, TransportError> {
        self.local_calls.lock().push(target.clone());

        let delay = self.delays.lock().get(&target.url).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.local.lock().get(&target.url).cloned();
        match scripted {
            Some(Scripted::Response(response)) => Ok(response),
            Some(Scripted::Error(error)) => Err(error),
            None => Ok(LocalResponse::new(200, "ok")),
        }
    }

    async fn submit_job(&self, job: &JobRequest) -> Result<JobSubmission, SubmitError> {
        let count = {
            let mut submissions = self.submissions.lock();
            submissions.push(job.clone());
            submissions.len()
        };

        if let Some(error) = self.rejections.lock().get(&job.url).cloned() {
            return Err(error);
        }

        Ok(JobSubmission {
            job_id: format!("job-{count}"),
            status: "queued".to_string(),
            idempotent_key: Some(job.idempotent_key.clone()),
        })
    }
}

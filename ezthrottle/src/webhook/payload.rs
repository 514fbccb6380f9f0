//! Typed webhook deliveries and a verifier bound to an account's secrets.

use super::secrets::WebhookSecretSet;
use super::signature::{
    try_verify_with_secrets, try_verify_with_secrets_at, VerificationResult,
    DEFAULT_TOLERANCE_SECS,
};
use crate::errors::EzThrottleError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Terminal status of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// The job completed successfully.
    Success,
    /// The job exhausted its retries.
    Failed,
}

/// The target's response as observed by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WebhookResponse {
    /// HTTP status returned by the target.
    pub status_code: u16,
    /// Response headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Response body.
    #[serde(default)]
    pub body: String,
}

/// A job-completion webhook body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookPayload {
    /// Backend job identifier.
    pub job_id: String,
    /// Key the job was deduplicated on.
    #[serde(default)]
    pub idempotent_key: Option<String>,
    /// Terminal status.
    pub status: JobStatus,
    /// Target response, when one was received.
    #[serde(default)]
    pub response: Option<WebhookResponse>,
    /// Metadata supplied at submission.
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl WebhookPayload {
    /// Returns true if the job succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Success
    }
}

/// Verifies deliveries for one account.
#[derive(Debug, Clone)]
pub struct WebhookVerifier {
    secrets: WebhookSecretSet,
    tolerance: u64,
}

impl WebhookVerifier {
    /// Creates a verifier with the default tolerance.
    #[must_use]
    pub fn new(secrets: WebhookSecretSet) -> Self {
        Self {
            secrets,
            tolerance: DEFAULT_TOLERANCE_SECS,
        }
    }

    /// Sets the timestamp tolerance in seconds.
    #[must_use]
    pub fn with_tolerance(mut self, tolerance: u64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Returns the timestamp tolerance in seconds.
    #[must_use]
    pub fn tolerance(&self) -> u64 {
        self.tolerance
    }

    /// Verifies a delivery with both secrets.
    #[must_use]
    pub fn verify(&self, payload: &[u8], signature_header: Option<&str>) -> VerificationResult {
        let result = try_verify_with_secrets(
            payload,
            signature_header,
            self.secrets.primary(),
            self.secrets.secondary(),
            self.tolerance,
        );
        log_result(&result);
        result
    }

    /// Verifies a delivery with both secrets at an explicit time.
    #[must_use]
    pub fn verify_at(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
        now: i64,
    ) -> VerificationResult {
        let result = try_verify_with_secrets_at(
            payload,
            signature_header,
            self.secrets.primary(),
            self.secrets.secondary(),
            self.tolerance,
            now,
        );
        log_result(&result);
        result
    }

    /// Verifies a delivery and deserializes its body.
    ///
    /// # Errors
    ///
    /// Returns [`EzThrottleError::WebhookVerification`] if the signature is
    /// refused, or [`EzThrottleError::Serialization`] if the body is not a
    /// webhook payload.
    pub fn verify_and_parse(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
    ) -> Result<WebhookPayload, EzThrottleError> {
        self.verify(payload, signature_header).into_result()?;
        Ok(serde_json::from_slice(payload)?)
    }

    /// [`Self::verify_and_parse`] at an explicit time.
    ///
    /// # Errors
    ///
    /// As [`Self::verify_and_parse`].
    pub fn verify_and_parse_at(
        &self,
        payload: &[u8],
        signature_header: Option<&str>,
        now: i64,
    ) -> Result<WebhookPayload, EzThrottleError> {
        self.verify_at(payload, signature_header, now).into_result()?;
        Ok(serde_json::from_slice(payload)?)
    }
}

fn log_result(result: &VerificationResult) {
    if result.verified {
        tracing::debug!(reason = %result.reason, "Webhook signature verified");
    } else {
        tracing::warn!(reason = %result.reason, "Webhook signature rejected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhook::sign_payload;

    const NOW: i64 = 1_700_000_000;

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new(
            WebhookSecretSet::new("new-secret-0123456789")
                .unwrap()
                .with_secondary("old-secret-0123456789")
                .unwrap(),
        )
    }

    fn body() -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "job_id": "job-7",
            "idempotent_key": "idem:abc",
            "status": "success",
            "response": {"status_code": 200, "headers": {}, "body": "{\"ok\":true}"},
            "metadata": {"order": "o-1"},
        }))
        .unwrap()
    }

    #[test]
    fn test_verify_and_parse() {
        let body = body();
        let header = sign_payload(&body, "old-secret-0123456789", NOW).unwrap();

        let payload = verifier().verify_and_parse_at(&body, Some(&header), NOW).unwrap();

        assert_eq!(payload.job_id, "job-7");
        assert!(payload.is_success());
        assert_eq!(payload.response.map(|r| r.status_code), Some(200));
        assert_eq!(payload.metadata.get("order"), Some(&serde_json::json!("o-1")));
    }

    #[test]
    fn test_rejected_signature_is_error() {
        let body = body();
        let header = sign_payload(&body, "attacker-secret-0123", NOW).unwrap();

        let err = verifier()
            .verify_and_parse_at(&body, Some(&header), NOW)
            .unwrap_err();

        assert!(matches!(
            err,
            EzThrottleError::WebhookVerification(ref e) if e.reason == "signature_mismatch"
        ));
    }

    #[test]
    fn test_verified_but_malformed_body() {
        let body = br#"{"hello":"world"}"#;
        let header = sign_payload(body, "new-secret-0123456789", NOW).unwrap();

        let err = verifier()
            .verify_and_parse_at(body, Some(&header), NOW)
            .unwrap_err();
        assert!(matches!(err, EzThrottleError::Serialization(_)));
    }

    #[test]
    fn test_failed_status_parses() {
        let payload: WebhookPayload =
            serde_json::from_str(r#"{"job_id":"j","status":"failed"}"#).unwrap();
        assert!(!payload.is_success());
        assert!(payload.response.is_none());
    }

    #[test]
    fn test_custom_tolerance() {
        let body = body();
        let header = sign_payload(&body, "new-secret-0123456789", NOW - 60).unwrap();

        let strict = verifier().with_tolerance(30);
        assert!(!strict.verify_at(&body, Some(&header), NOW).verified);
        assert!(verifier().verify_at(&body, Some(&header), NOW).verified);
    }
}

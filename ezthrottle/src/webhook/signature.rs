//! HMAC-SHA256 signatures on webhook deliveries.
//!
//! The backend signs each delivery with
//! `X-EZThrottle-Signature: t=<unix seconds>,v1=<hex>` where the hex digest is
//! `HMAC-SHA256(secret, "<t>.<raw body>")`.

use crate::errors::WebhookVerificationError;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the delivery signature.
pub const SIGNATURE_HEADER: &str = "X-EZThrottle-Signature";

/// Default maximum age of a signature timestamp, in seconds.
pub const DEFAULT_TOLERANCE_SECS: u64 = 300;

/// Why a signature was accepted or refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationReason {
    /// Signature matched the single secret supplied.
    Valid,
    /// Signature matched the primary secret.
    ValidPrimary,
    /// Signature matched the secondary secret.
    ValidSecondary,
    /// The header was missing or empty.
    NoSignatureHeader,
    /// The header had no `v1=` component.
    MissingV1Signature,
    /// The timestamp was outside the tolerance window.
    TimestampExpired {
        /// Observed distance from now, in seconds.
        diff: u64,
        /// Configured tolerance, in seconds.
        tolerance: u64,
    },
    /// The recomputed signature did not match.
    SignatureMismatch,
    /// The header could not be interpreted.
    VerificationError(String),
}

impl std::fmt::Display for VerificationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Valid => write!(f, "valid"),
            Self::ValidPrimary => write!(f, "valid_primary"),
            Self::ValidSecondary => write!(f, "valid_secondary"),
            Self::NoSignatureHeader => write!(f, "no_signature_header"),
            Self::MissingV1Signature => write!(f, "missing_v1_signature"),
            Self::TimestampExpired { diff, tolerance } => {
                write!(f, "timestamp_expired (diff={diff}s, tolerance={tolerance}s)")
            }
            Self::SignatureMismatch => write!(f, "signature_mismatch"),
            Self::VerificationError(details) => write!(f, "verification_error: {details}"),
        }
    }
}

/// Outcome of a verification attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationResult {
    /// Whether the delivery is authentic.
    pub verified: bool,
    /// Reason for the outcome.
    pub reason: VerificationReason,
}

impl VerificationResult {
    fn ok(reason: VerificationReason) -> Self {
        Self {
            verified: true,
            reason,
        }
    }

    fn fail(reason: VerificationReason) -> Self {
        Self {
            verified: false,
            reason,
        }
    }

    /// Converts a refusal into an error.
    ///
    /// # Errors
    ///
    /// Returns [`WebhookVerificationError`] when `verified` is false.
    pub fn into_result(self) -> Result<VerificationReason, WebhookVerificationError> {
        if self.verified {
            Ok(self.reason)
        } else {
            Err(WebhookVerificationError::new(self.reason.to_string()))
        }
    }
}

fn now_secs() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Computes the hex signature for a timestamp and raw body.
///
/// # Errors
///
/// Returns [`WebhookVerificationError`] if the MAC cannot be keyed.
pub fn compute_signature(
    secret: &str,
    timestamp: &str,
    payload: &[u8],
) -> Result<String, WebhookVerificationError> {
    let mac = keyed_mac(secret, timestamp, payload)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn keyed_mac(
    secret: &str,
    timestamp: &str,
    payload: &[u8],
) -> Result<HmacSha256, WebhookVerificationError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| WebhookVerificationError::new(format!("invalid key: {e}")))?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// Produces a signature header value for a body, as the backend would.
///
/// # Errors
///
/// Returns [`WebhookVerificationError`] if the MAC cannot be keyed.
pub fn sign_payload(
    payload: &[u8],
    secret: &str,
    timestamp: i64,
) -> Result<String, WebhookVerificationError> {
    let timestamp = timestamp.to_string();
    let signature = compute_signature(secret, &timestamp, payload)?;
    Ok(format!("t={timestamp},v1={signature}"))
}

/// Verifies a delivery against one secret using the current time.
#[must_use]
pub fn verify_webhook_signature(
    payload: &[u8],
    signature_header: Option<&str>,
    secret: &str,
    tolerance: u64,
) -> VerificationResult {
    verify_webhook_signature_at(payload, signature_header, secret, tolerance, now_secs())
}

/// Verifies a delivery against one secret at an explicit time.
#[must_use]
pub fn verify_webhook_signature_at(
    payload: &[u8],
    signature_header: Option<&str>,
    secret: &str,
    tolerance: u64,
    now: i64,
) -> VerificationResult {
    let Some(header) = signature_header.map(str::trim).filter(|h| !h.is_empty()) else {
        return VerificationResult::fail(VerificationReason::NoSignatureHeader);
    };

    let parts: HashMap<&str, &str> = header
        .split(',')
        .filter_map(|part| part.split_once('='))
        .map(|(k, v)| (k.trim(), v.trim()))
        .collect();

    let timestamp = parts.get("t").copied().unwrap_or("0");
    let signature = parts.get("v1").copied().unwrap_or("");

    if signature.is_empty() {
        return VerificationResult::fail(VerificationReason::MissingV1Signature);
    }

    let Ok(sig_time) = timestamp.parse::<i64>() else {
        return VerificationResult::fail(VerificationReason::VerificationError(format!(
            "invalid timestamp '{timestamp}'"
        )));
    };

    let diff = now.abs_diff(sig_time);
    if diff > tolerance {
        return VerificationResult::fail(VerificationReason::TimestampExpired { diff, tolerance });
    }

    let mac = match keyed_mac(secret, timestamp, payload) {
        Ok(mac) => mac,
        Err(err) => return VerificationResult::fail(VerificationReason::VerificationError(err.reason)),
    };
    let Ok(provided) = hex::decode(signature) else {
        return VerificationResult::fail(VerificationReason::SignatureMismatch);
    };
    match mac.verify_slice(&provided) {
        Ok(()) => VerificationResult::ok(VerificationReason::Valid),
        Err(_) => VerificationResult::fail(VerificationReason::SignatureMismatch),
    }
}

/// Verifies a delivery and returns an error on any refusal.
///
/// # Errors
///
/// Returns [`WebhookVerificationError`] carrying the refusal reason.
pub fn verify_webhook_signature_strict(
    payload: &[u8],
    signature_header: Option<&str>,
    secret: &str,
    tolerance: u64,
) -> Result<(), WebhookVerificationError> {
    verify_webhook_signature(payload, signature_header, secret, tolerance)
        .into_result()
        .map(|_| ())
}

/// Verifies with the primary secret, then the secondary one if supplied.
///
/// Used during secret rotation, when deliveries may still be signed with the
/// previous secret.
#[must_use]
pub fn try_verify_with_secrets(
    payload: &[u8],
    signature_header: Option<&str>,
    primary: &str,
    secondary: Option<&str>,
    tolerance: u64,
) -> VerificationResult {
    try_verify_with_secrets_at(payload, signature_header, primary, secondary, tolerance, now_secs())
}

/// Dual-secret verification at an explicit time.
///
/// When both secrets fail, the reason is the secondary attempt's, or the
/// primary's if no secondary was supplied.
#[must_use]
pub fn try_verify_with_secrets_at(
    payload: &[u8],
    signature_header: Option<&str>,
    primary: &str,
    secondary: Option<&str>,
    tolerance: u64,
    now: i64,
) -> VerificationResult {
    let first = verify_webhook_signature_at(payload, signature_header, primary, tolerance, now);
    if first.verified {
        return VerificationResult::ok(VerificationReason::ValidPrimary);
    }

    let Some(secondary) = secondary.filter(|s| !s.is_empty()) else {
        return first;
    };

    let second = verify_webhook_signature_at(payload, signature_header, secondary, tolerance, now);
    if second.verified {
        VerificationResult::ok(VerificationReason::ValidSecondary)
    } else {
        second
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_primary_0123456789";
    const OLD_SECRET: &str = "whsec_secondary_0123456789";
    const BODY: &[u8] = br#"{"job_id":"job-1","status":"success"}"#;
    const NOW: i64 = 1_700_000_000;

    fn sign(secret: &str, timestamp: i64) -> String {
        sign_payload(BODY, secret, timestamp).unwrap()
    }

    fn verify(body: &[u8], header: &str, secret: &str) -> VerificationResult {
        verify_webhook_signature_at(body, Some(header), secret, DEFAULT_TOLERANCE_SECS, NOW)
    }

    #[test]
    fn test_valid_signature() {
        let header = sign(SECRET, NOW);
        let result = verify(BODY, &header, SECRET);

        assert!(result.verified);
        assert_eq!(result.reason, VerificationReason::Valid);
        assert_eq!(result.reason.to_string(), "valid");
    }

    #[test]
    fn test_body_mutation_is_mismatch() {
        let header = sign(SECRET, NOW);
        let mut body = BODY.to_vec();
        body[3] ^= 0x01;

        assert_eq!(verify(&body, &header, SECRET).reason, VerificationReason::SignatureMismatch);
    }

    #[test]
    fn test_secret_mutation_is_mismatch() {
        let header = sign(SECRET, NOW);
        let result = verify(BODY, &header, "whsec_primary_0123456780");

        assert!(!result.verified);
        assert_eq!(result.reason, VerificationReason::SignatureMismatch);
    }

    #[test]
    fn test_signature_mutation_is_mismatch() {
        let header = sign(SECRET, NOW);
        let last = header.chars().last().unwrap();
        let swapped = if last == '0' { '1' } else { '0' };
        let mutated = format!("{}{swapped}", &header[..header.len() - 1]);

        assert_eq!(verify(BODY, &mutated, SECRET).reason, VerificationReason::SignatureMismatch);
    }

    #[test]
    fn test_malformed_hex_is_mismatch() {
        let header = sign(SECRET, NOW);
        let (t, _) = header.split_once(",v1=").unwrap();

        for bad in ["zz", "abc", "deadbeef"] {
            let forged = format!("{t},v1={bad}");
            assert_eq!(verify(BODY, &forged, SECRET).reason, VerificationReason::SignatureMismatch);
        }
    }

    #[test]
    fn test_expired_timestamp() {
        let header = sign(SECRET, NOW - 301);
        let result = verify(BODY, &header, SECRET);

        assert_eq!(
            result.reason,
            VerificationReason::TimestampExpired {
                diff: 301,
                tolerance: 300
            }
        );
        assert_eq!(
            result.reason.to_string(),
            "timestamp_expired (diff=301s, tolerance=300s)"
        );
    }

    #[test]
    fn test_future_timestamp_within_tolerance() {
        let header = sign(SECRET, NOW + 300);
        assert!(verify(BODY, &header, SECRET).verified);
    }

    #[test]
    fn test_missing_header() {
        let none = verify_webhook_signature_at(BODY, None, SECRET, 300, NOW);
        let empty = verify_webhook_signature_at(BODY, Some(""), SECRET, 300, NOW);

        assert_eq!(none.reason, VerificationReason::NoSignatureHeader);
        assert_eq!(empty.reason, VerificationReason::NoSignatureHeader);
    }

    #[test]
    fn test_missing_v1() {
        let result = verify(BODY, &format!("t={NOW}"), SECRET);
        assert_eq!(result.reason, VerificationReason::MissingV1Signature);
        assert_eq!(result.reason.to_string(), "missing_v1_signature");
    }

    #[test]
    fn test_missing_timestamp_defaults_to_epoch() {
        let signature = compute_signature(SECRET, "0", BODY).unwrap();
        let result = verify(BODY, &format!("v1={signature}"), SECRET);

        assert!(matches!(result.reason, VerificationReason::TimestampExpired { .. }));
    }

    #[test]
    fn test_garbage_timestamp_is_verification_error() {
        let result = verify(BODY, "t=yesterday,v1=abcd", SECRET);

        assert!(!result.verified);
        assert!(result.reason.to_string().starts_with("verification_error: "));
    }

    #[test]
    fn test_strict_variant() {
        let header = sign(SECRET, chrono::Utc::now().timestamp());
        assert!(verify_webhook_signature_strict(BODY, Some(&header), SECRET, 300).is_ok());

        let err = verify_webhook_signature_strict(BODY, Some(&header), OLD_SECRET, 300).unwrap_err();
        assert_eq!(err.reason, "signature_mismatch");
        assert_eq!(
            err.to_string(),
            "Webhook signature verification failed: signature_mismatch"
        );
    }

    #[test]
    fn test_dual_secret_primary() {
        let header = sign(SECRET, NOW);
        let result =
            try_verify_with_secrets_at(BODY, Some(&header), SECRET, Some(OLD_SECRET), 300, NOW);

        assert!(result.verified);
        assert_eq!(result.reason.to_string(), "valid_primary");
    }

    #[test]
    fn test_dual_secret_secondary() {
        let header = sign(OLD_SECRET, NOW);
        let result =
            try_verify_with_secrets_at(BODY, Some(&header), SECRET, Some(OLD_SECRET), 300, NOW);

        assert!(result.verified);
        assert_eq!(result.reason, VerificationReason::ValidSecondary);
    }

    #[test]
    fn test_dual_secret_both_fail_reports_secondary_reason() {
        let header = sign("whsec_someone_else_entirely", NOW);
        let result =
            try_verify_with_secrets_at(BODY, Some(&header), SECRET, Some(OLD_SECRET), 300, NOW);

        assert!(!result.verified);
        assert_eq!(result.reason, VerificationReason::SignatureMismatch);
    }

    #[test]
    fn test_dual_secret_without_secondary_reports_primary_reason() {
        let header = sign(SECRET, NOW - 1000);
        let result = try_verify_with_secrets_at(BODY, Some(&header), SECRET, None, 300, NOW);

        assert!(matches!(result.reason, VerificationReason::TimestampExpired { diff: 1000, .. }));
    }
}

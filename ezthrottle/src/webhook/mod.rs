//! Inbound webhook handling.
//!
//! Deliveries are authenticated with [`try_verify_with_secrets`] (or a
//! [`WebhookVerifier`] bound to an account's [`WebhookSecretSet`]) before
//! their body is trusted. Verified deliveries can then be routed to the
//! handlers waiting on their job through a [`ContinuationRegistry`].

mod continuations;
mod payload;
mod secrets;
mod signature;

pub use continuations::{ContinuationHandler, ContinuationRegistry, DispatchOutcome};
pub use payload::{JobStatus, WebhookPayload, WebhookResponse, WebhookVerifier};
pub use secrets::{mask_secret, MaskedSecretSet, WebhookSecretSet, MIN_SECRET_LEN};
pub use signature::{
    compute_signature, sign_payload, try_verify_with_secrets, try_verify_with_secrets_at,
    verify_webhook_signature, verify_webhook_signature_at, verify_webhook_signature_strict,
    VerificationReason, VerificationResult, DEFAULT_TOLERANCE_SECS, SIGNATURE_HEADER,
};

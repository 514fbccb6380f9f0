//! # ezthrottle
//!
//! Client SDK for describing HTTP work as step workflows and running it
//! either locally or through the EZThrottle backend.
//!
//! - **Steps**: fluent builders frozen into immutable, validated trees
//! - **Execution types**: FRUGAL steps call locally and forward on selected
//!   statuses; PERFORMANCE steps are submitted as backend jobs
//! - **Workflows**: success, failure and fallback edges between steps
//! - **Idempotency**: deterministic HASH keys or per-run UNIQUE keys
//! - **Webhooks**: HMAC signature checks with primary and secondary secrets
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use ezthrottle::prelude::*;
//!
//! let client = EzThrottleClient::from_env()?;
//!
//! let step = StepBuilder::new()
//!     .url("https://api.example.com/charge")
//!     .method("POST")
//!     .step_type(StepType::Frugal)
//!     .fallback(StepBuilder::new().url("https://backup.example.com/charge"), [500]);
//!
//! let result = client.engine().execute(&step).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod client;
pub mod config;
pub mod engine;
pub mod errors;
pub mod events;
pub mod forward;
pub mod idempotency;
pub mod observability;
pub mod step;
pub mod testing;
pub mod webhook;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::client::EzThrottleClient;
    pub use crate::config::ClientConfig;
    pub use crate::engine::{
        EdgeKind, Engine, ExecutionState, NodeOutcome, Transport, Verdict, WorkflowResult,
    };
    pub use crate::errors::{
        ConstructionError, EzThrottleError, LocalExecutionFailure, RemoteRejection,
        WebhookVerificationError,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::forward::{auto_forward, AutoForwarder, ForwardRequest, Forwardable};
    pub use crate::step::{
        ExecutionMode, IdempotentStrategy, RegionPolicy, RetryPolicy, Step, StepBuilder,
        StepType, Webhook,
    };
    pub use crate::webhook::{
        ContinuationRegistry, WebhookPayload, WebhookSecretSet, WebhookVerifier,
    };
}

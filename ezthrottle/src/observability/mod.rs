//! Logging setup and span helpers.
//!
//! The crate only emits `tracing` events. Binaries and tests that want to
//! see them install a subscriber with [`init_tracing`]; filtering follows
//! `RUST_LOG`.

use crate::step::Step;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Output format for [`init_tracing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

/// Installs a global subscriber filtered by `RUST_LOG` (default `info`).
///
/// Returns false if a global subscriber was already set.
pub fn init_tracing(format: LogFormat) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let layer = match format {
        LogFormat::Pretty => fmt::layer().with_target(true).boxed(),
        LogFormat::Json => fmt::layer().json().with_current_span(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
        .is_ok()
}

/// Span wrapping the execution of one workflow node.
#[must_use]
pub fn step_span(step: &Step) -> tracing::Span {
    tracing::info_span!(
        "ezthrottle.step",
        step = %step.name(),
        step_type = %step.step_type(),
        url = %step.target().url,
    )
}

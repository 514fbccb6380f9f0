//! Cooperative cancellation of workflow runs.

mod token;

pub use token::CancellationToken;

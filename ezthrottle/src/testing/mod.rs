//! Test doubles for code that drives the engine.

mod mocks;

pub use mocks::MockTransport;

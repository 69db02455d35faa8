//! Shared helpers for the integration tests.

pub mod containers;
pub mod mocks;
pub mod setup;

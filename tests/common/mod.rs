//! Shared fixtures for the integration tests

pub mod test_helpers;

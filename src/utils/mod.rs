//! Shared utilities.

pub mod backoff;
pub mod decimal;

pub use backoff::RetryPolicy;

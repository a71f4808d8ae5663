//! # Resilience
//!
//! Retry timing shared by remote lookups and batch-write retries.

pub mod backoff;

pub use backoff::BackoffPolicy;

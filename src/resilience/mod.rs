//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to the RPC endpoint:
//!     → timeouts.rs (enforce the per-request deadline)
//!     → On failure: retries.rs (classify, retry throttled calls with backoff)
//!     → backoff.rs (delay doubles per retry, starting at the initial delay)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Only throttling ("too many requests") is retried; everything else fails fast
//! - Retry state lives inside a single `execute` call and is never shared
//! - Dropping the returned future cancels any pending backoff sleep

pub mod backoff;
pub mod retries;
pub mod timeouts;

pub use retries::{RetryExecutor, RetryPolicy, Retryable};

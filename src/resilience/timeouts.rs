//! Timeout enforcement.
//!
//! Wraps a single RPC round-trip in a deadline. A timed-out call surfaces as
//! `LedgerError::Timeout`, which is distinct from throttling and therefore
//! never retried.

use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

use crate::ledger::types::{LedgerError, LedgerResult};

/// Run `fut` with a deadline of `limit`.
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> LedgerResult<T>
where
    F: Future<Output = LedgerResult<T>>,
{
    match timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(LedgerError::Timeout(limit.as_secs())),
    }
}

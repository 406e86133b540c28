//! Metrics collection.
//!
//! # Metrics
//! - `ledger_rpc_requests_total` (counter): RPC calls by method, outcome
//! - `ledger_rpc_duration_seconds` (histogram): RPC latency by method
//! - `ledger_rpc_retries_total` (counter): throttled calls that were retried
//! - `workflow_runs_total` (counter): workflow executions by workflow, outcome
//! - `poller_ticks_total` (counter): poll ticks by poller, outcome

use std::time::Duration;

/// Record a finished RPC call.
pub fn record_rpc_request(method: &'static str, outcome: &'static str, elapsed: Duration) {
    metrics::counter!("ledger_rpc_requests_total", "method" => method, "outcome" => outcome)
        .increment(1);
    metrics::histogram!("ledger_rpc_duration_seconds", "method" => method)
        .record(elapsed.as_secs_f64());
}

/// Record a retry caused by throttling.
pub fn record_retry(operation: &'static str) {
    metrics::counter!("ledger_rpc_retries_total", "method" => operation).increment(1);
}

/// Record the terminal outcome of a workflow run.
pub fn record_workflow(workflow: &'static str, success: bool) {
    let outcome = if success { "success" } else { "failure" };
    metrics::counter!("workflow_runs_total", "workflow" => workflow, "outcome" => outcome)
        .increment(1);
}

/// Record one poll tick.
pub fn record_poller_tick(poller: &'static str, success: bool) {
    let outcome = if success { "success" } else { "failure" };
    metrics::counter!("poller_ticks_total", "poller" => poller, "outcome" => outcome)
        .increment(1);
}

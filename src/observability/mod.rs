//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! RPC transport, retry executor, workflows, pollers produce:
//!     → logging.rs (structured log events via `tracing`)
//!     → metrics.rs (counters and histograms via the `metrics` facade)
//!
//! Consumers:
//!     → stdout (pretty for terminals, JSON for log shippers)
//!     → whatever metrics recorder the embedding process installs
//! ```
//!
//! # Design Decisions
//! - Structured fields (`account`, `mint`, `signature`, `attempt`) on every event
//! - Metrics are cheap facade calls; without a recorder they are no-ops
//! - Private keys never reach either sink

pub mod logging;
pub mod metrics;

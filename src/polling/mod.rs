//! Background pollers.
//!
//! # Data Flow
//! ```text
//! Session::start_polling
//!     → balance.rs (native + token balance)
//!     → history.rs (recent signatures + classified details)
//!     → drive loop: fetch now, then once per interval or on mint change
//!     → watch channel (whole snapshot replaced per tick)
//! ```
//!
//! # Design Decisions
//! - A fetch never overlaps the previous one; the next wait starts after it settles
//! - Fetch failures are logged and recorded on the snapshot, never fatal
//! - Stopping cancels an in-progress fetch or sleep; nothing is published afterwards

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::ledger::types::{LedgerError, LedgerResult, Mint};
use crate::lifecycle::session::Session;
use crate::lifecycle::shutdown::Shutdown;
use crate::observability::metrics;

pub mod balance;
pub mod history;

pub use balance::{BalancePoller, BalanceSnapshot};
pub use history::{
    classify_logs, explorer_tx_url, HistoryPoller, HistorySnapshot, TransactionKind, TransactionRecord,
};

/// One poller's fetch logic; the loop around it is shared.
#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
    type Snapshot: Clone + Send + Sync + 'static;

    /// Label for logs and metrics.
    const NAME: &'static str;

    fn session(&self) -> &Arc<Session>;

    fn interval(&self) -> Duration;

    /// Snapshot published before the first fetch completes.
    fn initial(&self) -> Self::Snapshot;

    /// Copy of `previous` flagged as loading, published before each fetch.
    fn loading_from(previous: Self::Snapshot) -> Self::Snapshot;

    async fn fetch(&self, mint: Option<Mint>) -> LedgerResult<Self::Snapshot>;

    /// Snapshot to publish when a fetch fails, derived from the previous one.
    fn on_error(previous: Self::Snapshot, error: &LedgerError) -> Self::Snapshot;
}

/// A running poller task.
#[derive(Debug)]
pub struct PollerTask {
    name: &'static str,
    stop: Arc<Shutdown>,
    handle: JoinHandle<()>,
}

impl PollerTask {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signal the loop and wait for it to exit.
    pub async fn stop(self) {
        self.stop.trigger();
        if let Err(e) = self.handle.await {
            tracing::warn!(poller = self.name, error = %e, "Poller task ended abnormally");
        }
    }
}

/// A running poller plus the receiver for its snapshots.
#[derive(Debug)]
pub struct PollerHandle<T> {
    feed: watch::Receiver<T>,
    task: PollerTask,
}

impl<T> PollerHandle<T> {
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.feed.clone()
    }

    pub fn into_parts(self) -> (watch::Receiver<T>, PollerTask) {
        (self.feed, self.task)
    }

    pub async fn stop(self) {
        self.task.stop().await;
    }
}

/// Spawn the shared poll loop for `fetcher`.
pub fn spawn<F: Fetcher>(fetcher: F) -> PollerHandle<F::Snapshot> {
    let (tx, feed) = watch::channel(fetcher.initial());
    let stop = Arc::new(Shutdown::new());
    let handle = tokio::spawn(drive(fetcher, stop.clone(), tx));
    tracing::debug!(poller = F::NAME, "Poller spawned");
    PollerHandle {
        feed,
        task: PollerTask {
            name: F::NAME,
            stop,
            handle,
        },
    }
}

async fn drive<F: Fetcher>(fetcher: F, stop: Arc<Shutdown>, feed: watch::Sender<F::Snapshot>) {
    let session = fetcher.session().clone();
    let mut mint_rx = session.subscribe_mint();

    loop {
        if stop.is_triggered() || !session.is_active() {
            break;
        }

        let mint = *mint_rx.borrow_and_update();
        let loading = F::loading_from(feed.borrow().clone());
        feed.send_replace(loading);

        let outcome = tokio::select! {
            biased;
            _ = stop.wait() => break,
            _ = session.shutdown().wait() => break,
            outcome = fetcher.fetch(mint) => outcome,
        };

        let snapshot = match outcome {
            Ok(snapshot) => {
                metrics::record_poller_tick(F::NAME, true);
                snapshot
            }
            Err(e) => {
                tracing::warn!(
                    poller = F::NAME,
                    session = %session.id(),
                    error = %e,
                    "Poll failed, keeping previous values"
                );
                metrics::record_poller_tick(F::NAME, false);
                let previous = feed.borrow().clone();
                F::on_error(previous, &e)
            }
        };

        if stop.is_triggered() || !session.is_active() {
            break;
        }
        feed.send_replace(snapshot);

        tokio::select! {
            biased;
            _ = stop.wait() => break,
            _ = session.shutdown().wait() => break,
            changed = mint_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                tracing::debug!(poller = F::NAME, "Mint changed, refreshing");
            }
            _ = sleep(fetcher.interval()) => {}
        }
    }

    tracing::debug!(poller = F::NAME, session = %session.id(), "Poller stopped");
}

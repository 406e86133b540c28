//! Recent transaction history of the session account.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::validation::MAX_HISTORY_LIMIT;
use crate::ledger::types::{ConfirmationStatus, LedgerError, LedgerResult, Mint, Signature};
use crate::lifecycle::session::Session;
use crate::polling::{spawn, Fetcher, PollerHandle};

/// What a transaction did, judged from its program logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TransactionKind {
    Create,
    Transfer,
    Mint,
    Other,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransactionKind::Create => "Create",
            TransactionKind::Transfer => "Transfer",
            TransactionKind::Mint => "Mint",
            TransactionKind::Other => "Other",
        };
        f.write_str(label)
    }
}

/// Classify by the first matching rule: mint initialization, then
/// transfer, then minting.
pub fn classify_logs<S: AsRef<str>>(logs: &[S]) -> TransactionKind {
    let any = |needles: &[&str]| {
        logs.iter()
            .any(|line| needles.iter().any(|n| line.as_ref().contains(n)))
    };

    if any(&["Initialize mint", "InitializeMint"]) {
        TransactionKind::Create
    } else if any(&["Transfer"]) {
        TransactionKind::Transfer
    } else if any(&["Mint to", "MintTo"]) {
        TransactionKind::Mint
    } else {
        TransactionKind::Other
    }
}

/// One entry of the history list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionRecord {
    pub signature: Signature,
    pub timestamp: Option<DateTime<Utc>>,
    pub status: Option<ConfirmationStatus>,
    pub kind: TransactionKind,
    /// The transaction landed with an execution error.
    pub failed: bool,
    pub slot: u64,
}

impl TransactionRecord {
    /// Block explorer link for this transaction.
    pub fn explorer_url(&self, cluster: &str) -> String {
        explorer_tx_url(&self.signature, cluster)
    }
}

pub fn explorer_tx_url(signature: &Signature, cluster: &str) -> String {
    format!(
        "https://explorer.solana.com/tx/{}?cluster={}",
        signature, cluster
    )
}

/// The history list at one point in time, newest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistorySnapshot {
    pub session: Uuid,
    pub records: Vec<TransactionRecord>,
    pub loading: bool,
    pub fetched_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Polls the session account's recent transactions.
pub struct HistoryPoller {
    session: Arc<Session>,
}

impl HistoryPoller {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    pub async fn fetch_once(&self) -> LedgerResult<HistorySnapshot> {
        self.fetch(self.session.mint()).await
    }

    pub fn spawn(self) -> PollerHandle<HistorySnapshot> {
        spawn(self)
    }

    fn limit(&self) -> usize {
        self.session
            .settings()
            .polling
            .history_limit
            .clamp(1, MAX_HISTORY_LIMIT)
    }
}

#[async_trait]
impl Fetcher for HistoryPoller {
    type Snapshot = HistorySnapshot;

    const NAME: &'static str = "history";

    fn session(&self) -> &Arc<Session> {
        &self.session
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(self.session.settings().polling.history_interval_secs)
    }

    fn initial(&self) -> HistorySnapshot {
        HistorySnapshot {
            session: self.session.id(),
            records: Vec::new(),
            loading: true,
            fetched_at: None,
            last_error: None,
        }
    }

    fn loading_from(previous: HistorySnapshot) -> HistorySnapshot {
        HistorySnapshot {
            loading: true,
            ..previous
        }
    }

    async fn fetch(&self, _mint: Option<Mint>) -> LedgerResult<HistorySnapshot> {
        let ledger = self.session.ledger();
        let limit = self.limit();
        let mut signatures = ledger
            .list_recent_signatures(&self.session.account(), limit)
            .await?;
        signatures.truncate(limit);

        let details = join_all(
            signatures
                .iter()
                .map(|info| ledger.get_transaction_detail(&info.signature)),
        )
        .await;

        let mut records: Vec<TransactionRecord> = signatures
            .into_iter()
            .zip(details)
            .map(|(info, detail)| {
                let (kind, failed) = match detail {
                    Ok(Some(detail)) => (
                        classify_logs(&detail.log_messages),
                        info.failed || detail.err.is_some(),
                    ),
                    Ok(None) => (TransactionKind::Other, info.failed),
                    Err(e) => {
                        tracing::debug!(signature = %info.signature, error = %e, "Transaction detail unavailable");
                        (TransactionKind::Other, info.failed)
                    }
                };
                TransactionRecord {
                    signature: info.signature,
                    timestamp: info
                        .block_time
                        .and_then(|secs| DateTime::from_timestamp(secs, 0)),
                    status: info.confirmation_status,
                    kind,
                    failed,
                    slot: info.slot,
                }
            })
            .collect();
        records.sort_by(|a, b| b.slot.cmp(&a.slot));

        tracing::debug!(
            session = %self.session.id(),
            records = records.len(),
            "History refreshed"
        );

        Ok(HistorySnapshot {
            session: self.session.id(),
            records,
            loading: false,
            fetched_at: Some(Utc::now()),
            last_error: None,
        })
    }

    fn on_error(previous: HistorySnapshot, error: &LedgerError) -> HistorySnapshot {
        HistorySnapshot {
            loading: false,
            last_error: Some(error.to_string()),
            ..previous
        }
    }
}

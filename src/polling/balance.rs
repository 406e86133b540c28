//! Live balance of the session account.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::ledger::programs::get_associated_token_address;
use crate::ledger::types::{format_token_amount, lamports_to_sol, LedgerError, LedgerResult, Mint, Pubkey};
use crate::lifecycle::session::Session;
use crate::polling::{spawn, Fetcher, PollerHandle};

/// Native and token balance of one account at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceSnapshot {
    /// Session that produced this snapshot.
    pub session: Uuid,
    pub account: Pubkey,
    pub lamports: u64,
    pub mint: Option<Mint>,
    /// Raw token units; `None` when no mint is selected.
    pub token_raw: Option<u64>,
    pub loading: bool,
    pub fetched_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl BalanceSnapshot {
    fn empty(session: Uuid, account: Pubkey) -> Self {
        Self {
            session,
            account,
            lamports: 0,
            mint: None,
            token_raw: None,
            loading: true,
            fetched_at: None,
            last_error: None,
        }
    }

    pub fn sol(&self) -> f64 {
        lamports_to_sol(self.lamports)
    }

    /// Token balance in display units.
    pub fn token_display(&self) -> Option<String> {
        match (self.mint, self.token_raw) {
            (Some(mint), Some(raw)) => Some(format_token_amount(raw, mint.decimals)),
            _ => None,
        }
    }
}

/// Polls the session account's balances.
pub struct BalancePoller {
    session: Arc<Session>,
}

impl BalancePoller {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// One fetch against the session's current mint.
    pub async fn fetch_once(&self) -> LedgerResult<BalanceSnapshot> {
        self.fetch(self.session.mint()).await
    }

    pub fn spawn(self) -> PollerHandle<BalanceSnapshot> {
        spawn(self)
    }
}

#[async_trait]
impl Fetcher for BalancePoller {
    type Snapshot = BalanceSnapshot;

    const NAME: &'static str = "balance";

    fn session(&self) -> &Arc<Session> {
        &self.session
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(self.session.settings().polling.balance_interval_secs)
    }

    fn initial(&self) -> BalanceSnapshot {
        BalanceSnapshot::empty(self.session.id(), self.session.account())
    }

    fn loading_from(previous: BalanceSnapshot) -> BalanceSnapshot {
        BalanceSnapshot {
            loading: true,
            ..previous
        }
    }

    async fn fetch(&self, mint: Option<Mint>) -> LedgerResult<BalanceSnapshot> {
        let account = self.session.account();
        let ledger = self.session.ledger();

        let lamports = ledger.get_native_balance(&account).await?;
        let token_raw = match mint {
            Some(mint) => {
                let address = get_associated_token_address(&account, &mint.address)?;
                Some(ledger.get_token_account(&address).await?.amount)
            }
            None => None,
        };

        tracing::debug!(
            session = %self.session.id(),
            account = %account,
            lamports = lamports,
            token_raw = ?token_raw,
            "Balance refreshed"
        );

        Ok(BalanceSnapshot {
            session: self.session.id(),
            account,
            lamports,
            mint,
            token_raw,
            loading: false,
            fetched_at: Some(Utc::now()),
            last_error: None,
        })
    }

    fn on_error(previous: BalanceSnapshot, error: &LedgerError) -> BalanceSnapshot {
        BalanceSnapshot {
            loading: false,
            last_error: Some(error.to_string()),
            ..previous
        }
    }
}

//! Mint creation.
//!
//! ```text
//! Idle → FundingAuthority → CreatingMint → Done
//!              │                  │
//!              └──────────────────┴──→ Failed
//! ```
//!
//! Every run generates a fresh throwaway keypair that receives test funds and
//! pays for the mint account. The session account becomes both the mint and
//! the freeze authority.

use std::sync::Arc;
use tokio::sync::watch;

use crate::ledger::types::{check_decimals, LedgerError, LedgerResult, Mint, Pubkey};
use crate::ledger::wallet::Keypair;
use crate::lifecycle::session::Session;
use crate::observability::metrics;
use crate::workflows::WorkflowKind;

/// Observable progress of a [`MintWorkflow`] run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MintState {
    Idle,
    /// Waiting for test funds to reach the throwaway payer.
    FundingAuthority { payer: Pubkey },
    CreatingMint { payer: Pubkey },
    Done(Mint),
    Failed(LedgerError),
}

pub struct MintWorkflow {
    session: Arc<Session>,
    decimals: u8,
    funding_lamports: u64,
    state: watch::Sender<MintState>,
}

impl MintWorkflow {
    /// Workflow using the session's configured decimals and funding amount.
    pub fn new(session: Arc<Session>) -> Self {
        let mint_config = &session.settings().mint;
        let decimals = mint_config.decimals;
        let funding_lamports = mint_config.funding_lamports;
        let (state, _) = watch::channel(MintState::Idle);
        Self {
            session,
            decimals,
            funding_lamports,
            state,
        }
    }

    pub fn with_decimals(mut self, decimals: u8) -> Self {
        self.decimals = decimals;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<MintState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> MintState {
        self.state.borrow().clone()
    }

    fn transition(&self, next: MintState) {
        tracing::info!(session = %self.session.id(), state = ?next, "Mint workflow state");
        self.state.send_replace(next);
    }

    /// Create a new mint and make it the session mint.
    pub async fn run(&self) -> LedgerResult<Mint> {
        let result = self.execute().await;
        metrics::record_workflow(WorkflowKind::CreateMint.as_str(), result.is_ok());

        match &result {
            Ok(mint) => {
                self.session.set_mint(*mint);
                self.transition(MintState::Done(*mint));
            }
            Err(e) => {
                tracing::warn!(session = %self.session.id(), error = %e, "Mint creation failed");
                self.transition(MintState::Failed(e.clone()));
            }
        }
        result
    }

    async fn execute(&self) -> LedgerResult<Mint> {
        let decimals = check_decimals(self.decimals)?;
        let session = &self.session;

        session
            .run_exclusive(WorkflowKind::CreateMint, async {
                let ledger = session.ledger();
                let payer = Keypair::generate();
                let payer_key = payer.pubkey();

                self.transition(MintState::FundingAuthority { payer: payer_key });
                ledger
                    .request_test_funds(&payer_key, self.funding_lamports)
                    .await?;
                let actual = ledger.get_native_balance(&payer_key).await?;
                if actual < self.funding_lamports {
                    return Err(LedgerError::InsufficientFunding {
                        expected: self.funding_lamports,
                        actual,
                    });
                }

                self.transition(MintState::CreatingMint { payer: payer_key });
                ledger
                    .create_mint(&payer, &session.account(), decimals)
                    .await
            })
            .await
    }
}

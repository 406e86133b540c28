//! User-triggered ledger workflows.
//!
//! # Data Flow
//! ```text
//! CLI command
//!     → Session::run_exclusive (one run per account and workflow kind)
//!     → mint.rs      fund throwaway payer → create mint
//!     → mint_to.rs   ensure token account → issue supply
//!     → transfer.rs  validate recipient → check balance → submit → confirm
//! ```
//!
//! # Design Decisions
//! - Workflows fail fast; pollers pick up the effects on their next tick
//! - Address and amount validation happens before any network call
//! - Only a successful mint creation updates the session's mint

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::ledger::types::{LedgerError, LedgerResult, Pubkey};

pub mod mint;
pub mod mint_to;
pub mod transfer;

pub use mint::{MintState, MintWorkflow};
pub use mint_to::MintToWorkflow;
pub use transfer::TransferWorkflow;

/// The kinds of workflow that are serialized per account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkflowKind {
    CreateMint,
    MintTo,
    Transfer,
}

impl WorkflowKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowKind::CreateMint => "create_mint",
            WorkflowKind::MintTo => "mint_to",
            WorkflowKind::Transfer => "transfer",
        }
    }
}

impl fmt::Display for WorkflowKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type Key = (Pubkey, WorkflowKind);

/// Registry of workflows currently running, keyed by account and kind.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    running: Arc<DashMap<Key, Instant>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the `(account, kind)` slot, or fail `WorkflowBusy` if taken.
    pub fn try_acquire(&self, account: Pubkey, kind: WorkflowKind) -> LedgerResult<InFlightGuard> {
        match self.running.entry((account, kind)) {
            Entry::Occupied(_) => {
                tracing::warn!(account = %account, workflow = %kind, "Workflow already in flight");
                Err(LedgerError::WorkflowBusy(kind.as_str()))
            }
            Entry::Vacant(slot) => {
                slot.insert(Instant::now());
                Ok(InFlightGuard {
                    running: self.running.clone(),
                    key: (account, kind),
                })
            }
        }
    }

    pub fn is_running(&self, account: &Pubkey, kind: WorkflowKind) -> bool {
        self.running.contains_key(&(*account, kind))
    }
}

/// Releases its slot in [`InFlight`] on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    running: Arc<DashMap<Key, Instant>>,
    key: Key,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Some((_, started)) = self.running.remove(&self.key) {
            tracing::debug!(
                account = %self.key.0,
                workflow = %self.key.1,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Workflow slot released"
            );
        }
    }
}

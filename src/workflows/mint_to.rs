//! Issue new supply of the session mint to the session account.

use std::sync::Arc;

use crate::ledger::types::{to_raw_amount, LedgerError, LedgerResult, Signature};
use crate::lifecycle::session::Session;
use crate::observability::metrics;
use crate::workflows::WorkflowKind;

pub struct MintToWorkflow {
    session: Arc<Session>,
}

impl MintToWorkflow {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// Mint `amount` whole tokens into the session account's token account,
    /// creating that account on first use.
    pub async fn run(&self, amount: u64) -> LedgerResult<Signature> {
        let result = self.execute(amount).await;
        metrics::record_workflow(WorkflowKind::MintTo.as_str(), result.is_ok());
        match &result {
            Ok(signature) => tracing::info!(
                session = %self.session.id(),
                amount = amount,
                signature = %signature,
                "Tokens minted"
            ),
            Err(e) => tracing::warn!(session = %self.session.id(), error = %e, "Mint to failed"),
        }
        result
    }

    async fn execute(&self, amount: u64) -> LedgerResult<Signature> {
        let session = &self.session;
        let mint = session
            .mint()
            .ok_or_else(|| LedgerError::NotInitialized("no mint created yet".into()))?;
        let raw_amount = to_raw_amount(amount, mint.decimals)?;

        session
            .run_exclusive(WorkflowKind::MintTo, async {
                let ledger = session.ledger();
                let signer = session.signer();
                let destination = ledger
                    .ensure_associated_account(&mint.address, &session.account(), signer)
                    .await?;
                ledger
                    .mint_to(&mint.address, &destination, signer, raw_amount)
                    .await
            })
            .await
    }
}

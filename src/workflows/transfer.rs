//! Send session-mint tokens to another account.

use std::sync::Arc;

use crate::ledger::programs::{create_associated_token_account_idempotent, get_associated_token_address};
use crate::ledger::types::{to_raw_amount, LedgerError, LedgerResult, Pubkey, Signature};
use crate::lifecycle::session::Session;
use crate::observability::metrics;
use crate::workflows::WorkflowKind;

pub struct TransferWorkflow {
    session: Arc<Session>,
}

impl TransferWorkflow {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// Transfer `amount` whole tokens to `recipient` and wait for confirmation.
    ///
    /// The recipient's token account is created in the same transaction when
    /// it does not exist yet, paid for by the sender.
    pub async fn run(&self, recipient: &str, amount: u64) -> LedgerResult<Signature> {
        let result = self.execute(recipient, amount).await;
        metrics::record_workflow(WorkflowKind::Transfer.as_str(), result.is_ok());
        match &result {
            Ok(signature) => tracing::info!(
                session = %self.session.id(),
                recipient = recipient,
                amount = amount,
                signature = %signature,
                "Transfer confirmed"
            ),
            Err(e) => tracing::warn!(
                session = %self.session.id(),
                recipient = recipient,
                error = %e,
                "Transfer failed"
            ),
        }
        result
    }

    async fn execute(&self, recipient: &str, amount: u64) -> LedgerResult<Signature> {
        let recipient: Pubkey = recipient.trim().parse()?;
        let session = &self.session;
        let mint = session
            .mint()
            .ok_or_else(|| LedgerError::NotInitialized("no mint created yet".into()))?;
        let raw_amount = to_raw_amount(amount, mint.decimals)?;

        session
            .run_exclusive(WorkflowKind::Transfer, async {
                let ledger = session.ledger();
                let owner = session.account();
                let source = get_associated_token_address(&owner, &mint.address)?;
                let destination = get_associated_token_address(&recipient, &mint.address)?;

                let available = ledger.get_token_account(&source).await?.amount;
                if raw_amount > available {
                    return Err(LedgerError::InsufficientBalance {
                        requested: raw_amount,
                        available,
                    });
                }

                let mut instructions = Vec::with_capacity(2);
                if !ledger.get_token_account(&destination).await?.exists {
                    tracing::debug!(recipient = %recipient, "Recipient token account missing, creating");
                    instructions.push(create_associated_token_account_idempotent(
                        &owner,
                        &recipient,
                        &mint.address,
                    )?);
                }
                instructions.push(ledger.build_transfer(&source, &destination, &owner, raw_amount));

                let signature = ledger.submit(session.signer(), &instructions).await?;
                ledger.await_confirmation(&signature).await?;
                Ok(signature)
            })
            .await
    }
}

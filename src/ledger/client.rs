//! Ledger client with retries and confirmation tracking.
//!
//! # Responsibilities
//! - Route every remote call through the [`RetryExecutor`]
//! - Build, sign and submit the token program transactions
//! - Wait for a submitted signature to reach the configured commitment
//! - Turn "account does not exist" into a zero balance

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, timeout};

use crate::config::{ConsoleConfig, RpcConfig};
use crate::ledger::programs::{self, MINT_ACCOUNT_LEN, TOKEN_PROGRAM_ID};
use crate::ledger::rpc::{RpcEndpoint, SignatureInfo, TransactionDetail};
use crate::ledger::transaction::{Instruction, Message, Transaction};
use crate::ledger::types::{
    check_decimals, ConfirmationStatus, Hash, LedgerError, LedgerResult, Mint, Pubkey, Signature,
    TokenAccountBalance,
};
use crate::ledger::wallet::{Keypair, Signer};
use crate::resilience::{RetryExecutor, RetryPolicy};

/// How long and how often to poll for a signature's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationSettings {
    pub commitment: ConfirmationStatus,
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for ConfirmationSettings {
    fn default() -> Self {
        Self::from(&RpcConfig::default())
    }
}

impl From<&RpcConfig> for ConfirmationSettings {
    fn from(config: &RpcConfig) -> Self {
        Self {
            commitment: config.commitment,
            poll_interval: Duration::from_millis(config.confirm_poll_interval_ms),
            timeout: Duration::from_secs(config.confirm_timeout_secs),
        }
    }
}

/// Ledger operations used by the workflows and pollers.
#[derive(Clone)]
pub struct LedgerClient {
    endpoint: Arc<dyn RpcEndpoint>,
    retry: RetryExecutor,
    confirmation: ConfirmationSettings,
}

impl LedgerClient {
    pub fn new(
        endpoint: Arc<dyn RpcEndpoint>,
        retry: RetryExecutor,
        confirmation: ConfirmationSettings,
    ) -> Self {
        Self {
            endpoint,
            retry,
            confirmation,
        }
    }

    pub fn from_config(endpoint: Arc<dyn RpcEndpoint>, config: &ConsoleConfig) -> Self {
        Self::new(
            endpoint,
            RetryExecutor::new(RetryPolicy::from(&config.retry)),
            ConfirmationSettings::from(&config.rpc),
        )
    }

    pub fn endpoint(&self) -> &Arc<dyn RpcEndpoint> {
        &self.endpoint
    }

    pub fn confirmation(&self) -> ConfirmationSettings {
        self.confirmation
    }

    fn rpc(&self) -> &dyn RpcEndpoint {
        self.endpoint.as_ref()
    }

    /// Native balance in lamports.
    pub async fn get_native_balance(&self, account: &Pubkey) -> LedgerResult<u64> {
        let rpc = self.rpc();
        self.retry
            .execute("getBalance", move || rpc.get_balance(account))
            .await
    }

    /// Airdrop `lamports` to `account` and wait for the airdrop to confirm.
    pub async fn request_test_funds(&self, account: &Pubkey, lamports: u64) -> LedgerResult<Signature> {
        let rpc = self.rpc();
        let signature = self
            .retry
            .execute("requestAirdrop", move || rpc.request_airdrop(account, lamports))
            .await?;
        tracing::info!(account = %account, lamports = lamports, signature = %signature, "Airdrop requested");
        self.await_confirmation(&signature).await?;
        Ok(signature)
    }

    /// Raw token balance of `address`; a missing account reads as zero.
    pub async fn get_token_account(&self, address: &Pubkey) -> LedgerResult<TokenAccountBalance> {
        let rpc = self.rpc();
        let account = match self
            .retry
            .execute("getAccountInfo", move || rpc.get_account(address))
            .await
        {
            Ok(account) => account,
            Err(LedgerError::AccountNotFound(_)) => None,
            Err(e) => return Err(e),
        };

        match account {
            Some(account) => Ok(TokenAccountBalance {
                amount: programs::unpack_token_account(&account.data)?.amount,
                exists: true,
            }),
            None => Ok(TokenAccountBalance::default()),
        }
    }

    /// Read an existing mint so a session can be attached to it.
    pub async fn get_mint(&self, address: &Pubkey) -> LedgerResult<Mint> {
        let rpc = self.rpc();
        let account = self
            .retry
            .execute("getAccountInfo", move || rpc.get_account(address))
            .await?
            .ok_or(LedgerError::AccountNotFound(*address))?;

        if account.owner != TOKEN_PROGRAM_ID {
            return Err(LedgerError::Encoding(format!(
                "{} is not owned by the token program",
                address
            )));
        }
        let layout = programs::unpack_mint(&account.data)?;
        if !layout.is_initialized {
            return Err(LedgerError::NotInitialized(format!("mint {} is not initialized", address)));
        }
        Ok(Mint {
            address: *address,
            decimals: layout.decimals,
            authority: layout.mint_authority,
        })
    }

    async fn latest_blockhash(&self) -> LedgerResult<Hash> {
        let rpc = self.rpc();
        self.retry
            .execute("getLatestBlockhash", move || rpc.get_latest_blockhash())
            .await
    }

    /// Create a mint paid for by `payer`, with `authority` as both the mint
    /// and freeze authority.
    pub async fn create_mint(
        &self,
        payer: &Keypair,
        authority: &Pubkey,
        decimals: u8,
    ) -> LedgerResult<Mint> {
        let decimals = check_decimals(decimals)?;
        let mint_keypair = Keypair::generate();
        let mint = mint_keypair.pubkey();

        let rpc = self.rpc();
        let rent = self
            .retry
            .execute("getMinimumBalanceForRentExemption", move || {
                rpc.get_minimum_balance_for_rent_exemption(MINT_ACCOUNT_LEN)
            })
            .await?;

        let instructions = [
            programs::create_account(
                &payer.pubkey(),
                &mint,
                rent,
                MINT_ACCOUNT_LEN as u64,
                &TOKEN_PROGRAM_ID,
            ),
            programs::initialize_mint2(&mint, authority, Some(authority), decimals),
        ];

        let blockhash = self.latest_blockhash().await?;
        let message = Message::compile(&instructions, &payer.pubkey(), blockhash)?;
        let mut transaction = Transaction::new_unsigned(message);
        transaction.sign(&[payer, &mint_keypair])?;

        let signature = self.send_signed(&transaction).await?;
        self.await_confirmation(&signature).await?;

        tracing::info!(mint = %mint, decimals = decimals, authority = %authority, "Mint created");
        Ok(Mint {
            address: mint,
            decimals,
            authority: Some(*authority),
        })
    }

    /// Return the associated token account for `(owner, mint)`, creating it
    /// first if it does not exist yet.
    pub async fn ensure_associated_account(
        &self,
        mint: &Pubkey,
        owner: &Pubkey,
        payer: &dyn Signer,
    ) -> LedgerResult<Pubkey> {
        let address = programs::get_associated_token_address(owner, mint)?;
        if self.get_token_account(&address).await?.exists {
            return Ok(address);
        }

        let payer_key = payer.public_key().ok_or(LedgerError::NotConnected)?;
        let create =
            programs::create_associated_token_account_idempotent(&payer_key, owner, mint)?;
        let signature = self.submit(payer, &[create]).await?;
        self.await_confirmation(&signature).await?;
        tracing::info!(owner = %owner, mint = %mint, token_account = %address, "Token account created");
        Ok(address)
    }

    /// Issue `raw_amount` new units into `destination`.
    pub async fn mint_to(
        &self,
        mint: &Pubkey,
        destination: &Pubkey,
        authority: &dyn Signer,
        raw_amount: u64,
    ) -> LedgerResult<Signature> {
        let authority_key = authority.public_key().ok_or(LedgerError::NotConnected)?;
        let instruction = programs::mint_to(mint, destination, &authority_key, raw_amount);
        let signature = self.submit(authority, &[instruction]).await?;
        self.await_confirmation(&signature).await?;
        Ok(signature)
    }

    /// Token transfer instruction between two token accounts.
    pub fn build_transfer(
        &self,
        source: &Pubkey,
        destination: &Pubkey,
        owner: &Pubkey,
        raw_amount: u64,
    ) -> Instruction {
        programs::transfer(source, destination, owner, raw_amount)
    }

    /// Compile `instructions` with the signer as fee payer and submit through
    /// the signer.
    pub async fn submit(
        &self,
        signer: &dyn Signer,
        instructions: &[Instruction],
    ) -> LedgerResult<Signature> {
        let payer = signer.public_key().ok_or(LedgerError::NotConnected)?;
        let blockhash = self.latest_blockhash().await?;
        let transaction = Transaction::new_unsigned(Message::compile(instructions, &payer, blockhash)?);

        let signature = self
            .retry
            .execute("sendTransaction", move || signer.sign_and_send(transaction.clone()))
            .await?;
        tracing::info!(signature = %signature, payer = %payer, "Transaction submitted");
        Ok(signature)
    }

    /// Submit a transaction already carrying all of its signatures.
    async fn send_signed(&self, transaction: &Transaction) -> LedgerResult<Signature> {
        let rpc = self.rpc();
        let signature = self
            .retry
            .execute("sendTransaction", move || rpc.send_transaction(transaction))
            .await?;
        tracing::info!(signature = %signature, "Transaction submitted");
        Ok(signature)
    }

    /// Poll until `signature` reaches the configured commitment.
    pub async fn await_confirmation(&self, signature: &Signature) -> LedgerResult<ConfirmationStatus> {
        let required = self.confirmation.commitment;
        let rpc = self.rpc();

        let result = timeout(self.confirmation.timeout, async {
            let mut ticker = interval(self.confirmation.poll_interval);

            loop {
                ticker.tick().await;

                let status = match self
                    .retry
                    .execute("getSignatureStatuses", move || rpc.get_signature_status(signature))
                    .await?
                {
                    Some(status) => status,
                    None => {
                        tracing::debug!(signature = %signature, "Transaction pending");
                        continue;
                    }
                };

                if let Some(reason) = status.err {
                    return Err(LedgerError::TransactionFailed {
                        signature: *signature,
                        reason,
                    });
                }

                match status.confirmation_status {
                    Some(reached) if reached.satisfies(required) => return Ok(reached),
                    reached => tracing::debug!(
                        signature = %signature,
                        reached = ?reached,
                        required = %required,
                        "Waiting for commitment"
                    ),
                }
            }
        })
        .await;

        match result {
            Ok(outcome) => {
                if let Ok(status) = &outcome {
                    tracing::debug!(signature = %signature, status = %status, "Transaction confirmed");
                }
                outcome
            }
            Err(_) => {
                tracing::warn!(signature = %signature, "Confirmation timed out");
                Err(LedgerError::ConfirmationTimeout(*signature))
            }
        }
    }

    /// Most recent signatures touching `account`, newest first.
    pub async fn list_recent_signatures(
        &self,
        account: &Pubkey,
        limit: usize,
    ) -> LedgerResult<Vec<SignatureInfo>> {
        let rpc = self.rpc();
        self.retry
            .execute("getSignaturesForAddress", move || {
                rpc.get_signatures_for_address(account, limit)
            })
            .await
    }

    /// Logs and outcome of a landed transaction.
    pub async fn get_transaction_detail(
        &self,
        signature: &Signature,
    ) -> LedgerResult<Option<TransactionDetail>> {
        let rpc = self.rpc();
        self.retry
            .execute("getTransaction", move || rpc.get_transaction(signature))
            .await
    }
}

impl std::fmt::Debug for LedgerClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerClient")
            .field("retry", &self.retry.policy())
            .field("confirmation", &self.confirmation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmation_settings_from_config() {
        let config = RpcConfig {
            confirm_poll_interval_ms: 250,
            confirm_timeout_secs: 5,
            commitment: ConfirmationStatus::Finalized,
            ..RpcConfig::default()
        };
        let settings = ConfirmationSettings::from(&config);
        assert_eq!(settings.poll_interval, Duration::from_millis(250));
        assert_eq!(settings.timeout, Duration::from_secs(5));
        assert_eq!(settings.commitment, ConfirmationStatus::Finalized);
    }

    #[test]
    fn test_default_settings() {
        let settings = ConfirmationSettings::default();
        assert_eq!(settings.commitment, ConfirmationStatus::Confirmed);
        assert_eq!(settings.poll_interval, Duration::from_millis(500));
        assert_eq!(settings.timeout, Duration::from_secs(60));
    }
}

//! Shared utilities for integration tests.
//!
//! [`FakeLedger`] is an in-memory ledger that executes the handful of system,
//! token and associated account instructions the console sends. It verifies
//! signatures, charges fees, emits program logs, keeps per-address history and
//! can be told to throttle specific RPC methods.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use token_console::config::ConsoleConfig;
use token_console::ledger::programs::{
    self, MintLayout, ASSOCIATED_TOKEN_PROGRAM_ID, MINT_ACCOUNT_LEN, SYSTEM_PROGRAM_ID,
    TOKEN_ACCOUNT_LEN, TOKEN_PROGRAM_ID,
};
use token_console::ledger::rpc::{
    AccountInfo, RpcEndpoint, SignatureInfo, SignatureStatus, TransactionDetail,
};
use token_console::ledger::transaction::{Instruction, Transaction};
use token_console::ledger::types::{
    ConfirmationStatus, Hash, LedgerError, LedgerResult, Mint, Pubkey, Signature,
    LAMPORTS_PER_SOL,
};
use token_console::ledger::wallet::{Keypair, KeypairSigner, Signer};
use token_console::ledger::LedgerClient;
use token_console::lifecycle::{Session, SessionSettings};
use token_console::workflows::InFlight;

/// Lamports charged per signature.
pub const FEE_PER_SIGNATURE: u64 = 5_000;

/// Simplified rent: two years of storage at the mainnet rate.
pub fn rent_for(space: usize) -> u64 {
    (128 + space as u64) * 3_480 * 2
}

#[derive(Debug, Clone)]
struct StoredTransaction {
    slot: u64,
    logs: Vec<String>,
    status_polls: u32,
}

impl StoredTransaction {
    /// Confirmed on first sight, finalized once polled again.
    fn status(&self) -> ConfirmationStatus {
        if self.status_polls >= 2 {
            ConfirmationStatus::Finalized
        } else {
            ConfirmationStatus::Confirmed
        }
    }
}

#[derive(Debug, Default)]
struct State {
    accounts: HashMap<Pubkey, AccountInfo>,
    transactions: HashMap<Signature, StoredTransaction>,
    /// Oldest first.
    history: HashMap<Pubkey, Vec<Signature>>,
    slot: u64,
    airdrops: u64,
    airdrop_cap: Option<u64>,
    stall_confirmations: bool,
    throttles: HashMap<&'static str, u32>,
    calls: HashMap<&'static str, u32>,
    sends: u32,
    ata_creations: u32,
    mint_tos: u32,
    transfers: u32,
}

/// In-memory ledger implementing [`RpcEndpoint`].
#[derive(Debug, Default)]
pub struct FakeLedger {
    state: Mutex<State>,
}

impl FakeLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Count the call and fail it if `method` is being throttled.
    fn enter(&self, method: &'static str) -> LedgerResult<()> {
        let mut state = self.state();
        *state.calls.entry(method).or_default() += 1;
        if let Some(remaining) = state.throttles.get_mut(method) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(LedgerError::RateLimited(format!("{}: 429", method)));
            }
        }
        Ok(())
    }

    /// Reject the next `times` calls of `method` with a rate limit.
    pub fn throttle(&self, method: &'static str, times: u32) {
        self.state().throttles.insert(method, times);
    }

    pub fn calls(&self, method: &str) -> u32 {
        self.state().calls.get(method).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.state().calls.values().sum()
    }

    pub fn reset_calls(&self) {
        let mut state = self.state();
        state.calls.clear();
        state.sends = 0;
        state.ata_creations = 0;
        state.mint_tos = 0;
        state.transfers = 0;
    }

    /// Transactions accepted by `sendTransaction`.
    pub fn sends(&self) -> u32 {
        self.state().sends
    }

    pub fn ata_creations(&self) -> u32 {
        self.state().ata_creations
    }

    pub fn mint_tos(&self) -> u32 {
        self.state().mint_tos
    }

    pub fn transfers(&self) -> u32 {
        self.state().transfers
    }

    /// Airdrops deliver at most `lamports`.
    pub fn cap_airdrops(&self, lamports: u64) {
        self.state().airdrop_cap = Some(lamports);
    }

    /// Landed transactions stay unknown to `getSignatureStatuses`.
    pub fn stall_confirmations(&self) {
        self.state().stall_confirmations = true;
    }

    pub fn fund(&self, account: &Pubkey, lamports: u64) {
        let mut state = self.state();
        credit(&mut state.accounts, account, lamports);
    }

    pub fn lamports(&self, account: &Pubkey) -> u64 {
        self.state()
            .accounts
            .get(account)
            .map(|a| a.lamports)
            .unwrap_or(0)
    }

    /// Install an initialized mint directly.
    pub fn seed_mint(&self, authority: &Pubkey, decimals: u8) -> Mint {
        let address = Keypair::generate().pubkey();
        let layout = MintLayout {
            mint_authority: Some(*authority),
            supply: 0,
            decimals,
            is_initialized: true,
            freeze_authority: Some(*authority),
        };
        self.state().accounts.insert(
            address,
            AccountInfo {
                lamports: rent_for(MINT_ACCOUNT_LEN),
                owner: TOKEN_PROGRAM_ID,
                data: programs::pack_mint(&layout),
            },
        );
        Mint {
            address,
            decimals,
            authority: Some(*authority),
        }
    }

    /// Install `owner`'s associated token account holding `amount` raw units.
    pub fn seed_token_account(&self, owner: &Pubkey, mint: &Pubkey, amount: u64) -> Pubkey {
        let address = programs::get_associated_token_address(owner, mint).unwrap();
        self.state().accounts.insert(
            address,
            AccountInfo {
                lamports: rent_for(TOKEN_ACCOUNT_LEN),
                owner: TOKEN_PROGRAM_ID,
                data: programs::pack_token_account(mint, owner, amount),
            },
        );
        address
    }

    /// Raw balance of `owner`'s associated token account, zero if absent.
    pub fn token_balance(&self, owner: &Pubkey, mint: &Pubkey) -> u64 {
        let address = programs::get_associated_token_address(owner, mint).unwrap();
        self.state()
            .accounts
            .get(&address)
            .map(|a| programs::unpack_token_account(&a.data).unwrap().amount)
            .unwrap_or(0)
    }

    pub fn mint_supply(&self, mint: &Pubkey) -> u64 {
        let state = self.state();
        let account = state.accounts.get(mint).expect("mint exists");
        programs::unpack_mint(&account.data).unwrap().supply
    }

    fn record(state: &mut State, signature: Signature, keys: &[Pubkey], logs: Vec<String>) {
        state.slot += 1;
        let slot = state.slot;
        state.transactions.insert(
            signature,
            StoredTransaction {
                slot,
                logs,
                status_polls: 0,
            },
        );
        for key in keys {
            state.history.entry(*key).or_default().push(signature);
        }
    }
}

fn credit(accounts: &mut HashMap<Pubkey, AccountInfo>, account: &Pubkey, lamports: u64) {
    accounts
        .entry(*account)
        .or_insert_with(|| AccountInfo {
            lamports: 0,
            owner: SYSTEM_PROGRAM_ID,
            data: Vec::new(),
        })
        .lamports += lamports;
}

fn debit(
    accounts: &mut HashMap<Pubkey, AccountInfo>,
    account: &Pubkey,
    lamports: u64,
) -> Result<(), String> {
    let entry = accounts
        .get_mut(account)
        .ok_or_else(|| format!("account {} has no funds", account))?;
    entry.lamports = entry
        .lamports
        .checked_sub(lamports)
        .ok_or_else(|| format!("insufficient lamports in {}", account))?;
    Ok(())
}

fn read_u64(data: &[u8], offset: usize) -> Result<u64, String> {
    data.get(offset..offset + 8)
        .map(|b| u64::from_le_bytes(b.try_into().unwrap()))
        .ok_or_else(|| "instruction data too short".to_string())
}

fn read_key(data: &[u8], offset: usize) -> Result<Pubkey, String> {
    data.get(offset..offset + 32)
        .map(|b| Pubkey::new_from_array(b.try_into().unwrap()))
        .ok_or_else(|| "instruction data too short".to_string())
}

#[derive(Default)]
struct Effects {
    ata_creations: u32,
    mint_tos: u32,
    transfers: u32,
}

fn execute(
    accounts: &mut HashMap<Pubkey, AccountInfo>,
    ix: &Instruction,
    logs: &mut Vec<String>,
    effects: &mut Effects,
) -> Result<(), String> {
    let key = |i: usize| {
        ix.accounts
            .get(i)
            .map(|m| m.pubkey)
            .ok_or_else(|| format!("missing account #{}", i))
    };
    let require_signer = |i: usize| -> Result<(), String> {
        match ix.accounts.get(i) {
            Some(meta) if meta.is_signer => Ok(()),
            _ => Err(format!("account #{} must sign", i)),
        }
    };

    if ix.program_id == SYSTEM_PROGRAM_ID {
        logs.push(format!("Program {} invoke [1]", SYSTEM_PROGRAM_ID));
        if ix.data.get(0..4) != Some(&[0, 0, 0, 0][..]) {
            return Err("unsupported system instruction".into());
        }
        require_signer(0)?;
        require_signer(1)?;
        let (payer, new_account) = (key(0)?, key(1)?);
        let lamports = read_u64(&ix.data, 4)?;
        let space = read_u64(&ix.data, 12)? as usize;
        let owner = read_key(&ix.data, 20)?;
        if accounts.contains_key(&new_account) {
            return Err(format!("account {} already in use", new_account));
        }
        debit(accounts, &payer, lamports)?;
        accounts.insert(
            new_account,
            AccountInfo {
                lamports,
                owner,
                data: vec![0; space],
            },
        );
        logs.push(format!("Program {} success", SYSTEM_PROGRAM_ID));
        return Ok(());
    }

    if ix.program_id == TOKEN_PROGRAM_ID {
        logs.push(format!("Program {} invoke [1]", TOKEN_PROGRAM_ID));
        let tag = *ix.data.first().ok_or("empty token instruction")?;
        match tag {
            20 => {
                logs.push("Program log: Instruction: InitializeMint2".into());
                let mint = key(0)?;
                let decimals = ix.data[1];
                let authority = read_key(&ix.data, 2)?;
                let freeze = match ix.data.get(34) {
                    Some(1) => Some(read_key(&ix.data, 35)?),
                    _ => None,
                };
                let account = accounts.get_mut(&mint).ok_or("mint account missing")?;
                if account.owner != TOKEN_PROGRAM_ID || account.data.len() != MINT_ACCOUNT_LEN {
                    return Err("mint account not allocated for the token program".into());
                }
                if programs::unpack_mint(&account.data).map_err(|e| e.to_string())?.is_initialized {
                    return Err("mint already initialized".into());
                }
                account.data = programs::pack_mint(&MintLayout {
                    mint_authority: Some(authority),
                    supply: 0,
                    decimals,
                    is_initialized: true,
                    freeze_authority: freeze,
                });
            }
            7 => {
                logs.push("Program log: Instruction: MintTo".into());
                require_signer(2)?;
                let (mint, destination, authority) = (key(0)?, key(1)?, key(2)?);
                let amount = read_u64(&ix.data, 1)?;

                let mint_account = accounts.get(&mint).ok_or("mint missing")?;
                let mut layout =
                    programs::unpack_mint(&mint_account.data).map_err(|e| e.to_string())?;
                if layout.mint_authority != Some(authority) {
                    return Err("owner does not match".into());
                }
                let dest_account = accounts.get(&destination).ok_or("destination missing")?;
                let dest = programs::unpack_token_account(&dest_account.data)
                    .map_err(|e| e.to_string())?;
                if dest.mint != mint {
                    return Err("account not associated with this mint".into());
                }

                layout.supply = layout.supply.checked_add(amount).ok_or("supply overflow")?;
                let new_amount = dest.amount.checked_add(amount).ok_or("balance overflow")?;
                if let Some(account) = accounts.get_mut(&mint) {
                    account.data = programs::pack_mint(&layout);
                }
                if let Some(account) = accounts.get_mut(&destination) {
                    account.data = programs::pack_token_account(&dest.mint, &dest.owner, new_amount);
                }
                effects.mint_tos += 1;
            }
            3 => {
                logs.push("Program log: Instruction: Transfer".into());
                require_signer(2)?;
                let (source, destination, owner) = (key(0)?, key(1)?, key(2)?);
                let amount = read_u64(&ix.data, 1)?;

                let src = accounts
                    .get(&source)
                    .ok_or("source missing")
                    .and_then(|a| programs::unpack_token_account(&a.data).map_err(|_| "bad source"))?;
                let dst = accounts
                    .get(&destination)
                    .ok_or("destination missing")
                    .and_then(|a| {
                        programs::unpack_token_account(&a.data).map_err(|_| "bad destination")
                    })?;
                if src.owner != owner {
                    return Err("owner does not match".into());
                }
                if src.mint != dst.mint {
                    return Err("account not associated with this mint".into());
                }
                if src.amount < amount {
                    return Err("insufficient funds".into());
                }

                if source == destination {
                    effects.transfers += 1;
                } else {
                    if let Some(account) = accounts.get_mut(&source) {
                        account.data =
                            programs::pack_token_account(&src.mint, &src.owner, src.amount - amount);
                    }
                    if let Some(account) = accounts.get_mut(&destination) {
                        account.data =
                            programs::pack_token_account(&dst.mint, &dst.owner, dst.amount + amount);
                    }
                    effects.transfers += 1;
                }
            }
            other => return Err(format!("unsupported token instruction {}", other)),
        }
        logs.push(format!("Program {} success", TOKEN_PROGRAM_ID));
        return Ok(());
    }

    if ix.program_id == ASSOCIATED_TOKEN_PROGRAM_ID {
        logs.push(format!("Program {} invoke [1]", ASSOCIATED_TOKEN_PROGRAM_ID));
        logs.push("Program log: CreateIdempotent".into());
        require_signer(0)?;
        let (payer, address, owner, mint) = (key(0)?, key(1)?, key(2)?, key(3)?);
        let expected =
            programs::get_associated_token_address(&owner, &mint).map_err(|e| e.to_string())?;
        if expected != address {
            return Err("provided seeds do not result in a valid address".into());
        }
        if !accounts.contains_key(&address) {
            logs.push("Program log: Initialize the associated token account".into());
            logs.push("Program log: Instruction: InitializeAccount3".into());
            let rent = rent_for(TOKEN_ACCOUNT_LEN);
            debit(accounts, &payer, rent)?;
            accounts.insert(
                address,
                AccountInfo {
                    lamports: rent,
                    owner: TOKEN_PROGRAM_ID,
                    data: programs::pack_token_account(&mint, &owner, 0),
                },
            );
            effects.ata_creations += 1;
        }
        logs.push(format!("Program {} success", ASSOCIATED_TOKEN_PROGRAM_ID));
        return Ok(());
    }

    Err(format!("unknown program {}", ix.program_id))
}

#[async_trait]
impl RpcEndpoint for FakeLedger {
    async fn get_balance(&self, account: &Pubkey) -> LedgerResult<u64> {
        self.enter("getBalance")?;
        Ok(self.lamports(account))
    }

    async fn request_airdrop(&self, account: &Pubkey, lamports: u64) -> LedgerResult<Signature> {
        self.enter("requestAirdrop")?;
        let mut state = self.state();
        let delivered = state.airdrop_cap.map_or(lamports, |cap| cap.min(lamports));
        credit(&mut state.accounts, account, delivered);

        state.airdrops += 1;
        let mut bytes = [0xA1u8; 64];
        bytes[..8].copy_from_slice(&state.airdrops.to_le_bytes());
        let signature = Signature::new_from_array(bytes);
        let logs = vec![
            format!("Program {} invoke [1]", SYSTEM_PROGRAM_ID),
            format!("Program {} success", SYSTEM_PROGRAM_ID),
        ];
        Self::record(&mut state, signature, &[*account], logs);
        Ok(signature)
    }

    async fn get_account(&self, address: &Pubkey) -> LedgerResult<Option<AccountInfo>> {
        self.enter("getAccountInfo")?;
        Ok(self.state().accounts.get(address).cloned())
    }

    async fn get_latest_blockhash(&self) -> LedgerResult<Hash> {
        self.enter("getLatestBlockhash")?;
        let slot = self.state().slot;
        let mut bytes = [0x5Bu8; 32];
        bytes[..8].copy_from_slice(&slot.to_le_bytes());
        Ok(Hash::new_from_array(bytes))
    }

    async fn get_minimum_balance_for_rent_exemption(&self, space: usize) -> LedgerResult<u64> {
        self.enter("getMinimumBalanceForRentExemption")?;
        Ok(rent_for(space))
    }

    async fn send_transaction(&self, transaction: &Transaction) -> LedgerResult<Signature> {
        self.enter("sendTransaction")?;
        let signature = transaction.signature();
        let failed = |reason: String| LedgerError::TransactionFailed { signature, reason };

        if !transaction.verify() {
            return Err(failed("signature verification failed".into()));
        }

        let mut state = self.state();
        if state.transactions.contains_key(&signature) {
            return Ok(signature);
        }

        let message = &transaction.message;
        let payer = *message
            .fee_payer()
            .ok_or_else(|| failed("missing fee payer".into()))?;
        let instructions = message.decompile().map_err(|e| failed(e.to_string()))?;

        let mut accounts = state.accounts.clone();
        let mut logs = Vec::new();
        let mut effects = Effects::default();
        let fee = FEE_PER_SIGNATURE * transaction.signatures.len() as u64;
        debit(&mut accounts, &payer, fee).map_err(failed)?;
        for ix in &instructions {
            execute(&mut accounts, ix, &mut logs, &mut effects).map_err(failed)?;
        }

        state.accounts = accounts;
        state.sends += 1;
        state.ata_creations += effects.ata_creations;
        state.mint_tos += effects.mint_tos;
        state.transfers += effects.transfers;
        Self::record(&mut state, signature, &message.account_keys, logs);
        Ok(signature)
    }

    async fn get_signature_status(
        &self,
        signature: &Signature,
    ) -> LedgerResult<Option<SignatureStatus>> {
        self.enter("getSignatureStatuses")?;
        let mut state = self.state();
        if state.stall_confirmations {
            return Ok(None);
        }
        Ok(state.transactions.get_mut(signature).map(|tx| {
            tx.status_polls += 1;
            SignatureStatus {
                slot: tx.slot,
                confirmation_status: Some(tx.status()),
                err: None,
            }
        }))
    }

    async fn get_signatures_for_address(
        &self,
        address: &Pubkey,
        limit: usize,
    ) -> LedgerResult<Vec<SignatureInfo>> {
        self.enter("getSignaturesForAddress")?;
        let state = self.state();
        let history = state.history.get(address).cloned().unwrap_or_default();
        Ok(history
            .iter()
            .rev()
            .take(limit)
            .filter_map(|sig| {
                state.transactions.get(sig).map(|tx| SignatureInfo {
                    signature: *sig,
                    slot: tx.slot,
                    block_time: Some(1_700_000_000 + tx.slot as i64),
                    confirmation_status: Some(tx.status()),
                    failed: false,
                })
            })
            .collect())
    }

    async fn get_transaction(
        &self,
        signature: &Signature,
    ) -> LedgerResult<Option<TransactionDetail>> {
        self.enter("getTransaction")?;
        Ok(self
            .state()
            .transactions
            .get(signature)
            .map(|tx| TransactionDetail {
                slot: tx.slot,
                block_time: Some(1_700_000_000 + tx.slot as i64),
                log_messages: tx.logs.clone(),
                err: None,
            }))
    }
}

/// A wallet that is present but has no account selected.
#[derive(Debug, Default)]
pub struct EmptyWallet;

#[async_trait]
impl Signer for EmptyWallet {
    fn public_key(&self) -> Option<Pubkey> {
        None
    }

    async fn sign_and_send(&self, _transaction: Transaction) -> LedgerResult<Signature> {
        Err(LedgerError::NotConnected)
    }
}

/// Default config with fast confirmation polling.
pub fn test_config() -> ConsoleConfig {
    let mut config = ConsoleConfig::default();
    config.rpc.confirm_poll_interval_ms = 100;
    config.rpc.confirm_timeout_secs = 10;
    config
}

pub fn ledger_client(fake: &Arc<FakeLedger>) -> LedgerClient {
    let endpoint: Arc<dyn RpcEndpoint> = fake.clone();
    LedgerClient::from_config(endpoint, &test_config())
}

/// A connected, funded session on `fake`.
pub fn session(fake: &Arc<FakeLedger>) -> (Arc<Session>, Arc<KeypairSigner>) {
    session_with(fake, Keypair::generate(), InFlight::new())
}

pub fn session_with(
    fake: &Arc<FakeLedger>,
    keypair: Keypair,
    in_flight: InFlight,
) -> (Arc<Session>, Arc<KeypairSigner>) {
    fake.fund(&keypair.pubkey(), 10 * LAMPORTS_PER_SOL);
    let endpoint: Arc<dyn RpcEndpoint> = fake.clone();
    let signer = Arc::new(KeypairSigner::new(keypair, endpoint));
    let session = Session::activate(
        signer.clone(),
        ledger_client(fake),
        SessionSettings::from(&test_config()),
        in_flight,
    )
    .unwrap();
    (session, signer)
}

//! Ledger identities, amounts, and error definitions.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::resilience::retries::Retryable;

/// Size of an account key in bytes.
pub const PUBKEY_BYTES: usize = 32;

/// Size of a transaction signature in bytes.
pub const SIGNATURE_BYTES: usize = 64;

/// Lamports in one SOL.
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Highest decimal precision a mint may be created with.
pub const MAX_DECIMALS: u8 = 9;

/// Errors that can occur while talking to the ledger or running a workflow.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// The RPC endpoint signalled "too many requests".
    #[error("rate limited by RPC endpoint: {0}")]
    RateLimited(String),

    /// A string could not be decoded into an account identity.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// The requested account does not exist on the ledger.
    #[error("account not found: {0}")]
    AccountNotFound(Pubkey),

    /// Airdropped funds did not arrive in full.
    #[error("insufficient funding: expected {expected} lamports, found {actual}")]
    InsufficientFunding { expected: u64, actual: u64 },

    /// The source token account holds less than the requested amount.
    #[error("insufficient token balance: requested {requested}, available {available}")]
    InsufficientBalance { requested: u64, available: u64 },

    /// A prerequisite step has not completed yet.
    #[error("not initialized: {0}")]
    NotInitialized(String),

    /// No signer is connected to the session.
    #[error("wallet not connected")]
    NotConnected,

    /// The same workflow is already running for this account.
    #[error("{0} already in flight for this account")]
    WorkflowBusy(&'static str),

    /// Amount is zero or overflows once scaled by the mint decimals.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Decimals outside `0..=9`.
    #[error("invalid decimals {0}: must be between 0 and {max}", max = MAX_DECIMALS)]
    InvalidDecimals(u8),

    /// Transaction landed but reported an execution error.
    #[error("transaction {signature} failed: {reason}")]
    TransactionFailed { signature: Signature, reason: String },

    /// Transaction did not reach the required commitment in time.
    #[error("transaction {0} not confirmed in time")]
    ConfirmationTimeout(Signature),

    /// RPC request timed out.
    #[error("RPC timeout after {0} seconds")]
    Timeout(u64),

    /// Wire encoding or decoding failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Any other remote or transport failure.
    #[error("remote failure: {0}")]
    RemoteFailure(String),
}

impl Retryable for LedgerError {
    fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::RateLimited(_))
    }
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N], String> {
    let bytes = bs58::decode(s)
        .into_vec()
        .map_err(|e| format!("base58 decode failed for '{}': {}", s, e))?;
    bytes
        .try_into()
        .map_err(|v: Vec<u8>| format!("expected {} bytes, got {}", N, v.len()))
}

/// A 32-byte account identity, exchanged as a base58 string.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pubkey([u8; PUBKEY_BYTES]);

impl Pubkey {
    pub const fn new_from_array(bytes: [u8; PUBKEY_BYTES]) -> Self {
        Self(bytes)
    }

    pub fn to_bytes(self) -> [u8; PUBKEY_BYTES] {
        self.0
    }

    pub fn as_bytes(&self) -> &[u8; PUBKEY_BYTES] {
        &self.0
    }
}

impl FromStr for Pubkey {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_fixed::<PUBKEY_BYTES>(s)
            .map(Self)
            .map_err(LedgerError::InvalidAddress)
    }
}

impl fmt::Display for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Pubkey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pubkey({})", self)
    }
}

/// A 64-byte transaction signature, doubling as the transaction id.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature([u8; SIGNATURE_BYTES]);

impl Signature {
    pub const fn new_from_array(bytes: [u8; SIGNATURE_BYTES]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_BYTES] {
        &self.0
    }

    /// Shortened `first8...last8` form for display.
    pub fn short(&self) -> String {
        let full = self.to_string();
        if full.len() <= 16 {
            return full;
        }
        format!("{}...{}", &full[..8], &full[full.len() - 8..])
    }
}

impl Default for Signature {
    fn default() -> Self {
        Self([0u8; SIGNATURE_BYTES])
    }
}

impl FromStr for Signature {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_fixed::<SIGNATURE_BYTES>(s)
            .map(Self)
            .map_err(LedgerError::Encoding)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.short())
    }
}

/// A recent blockhash, required in every transaction message.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Hash([u8; 32]);

impl Hash {
    pub const fn new_from_array(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl FromStr for Hash {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        decode_fixed::<32>(s).map(Self).map_err(LedgerError::Encoding)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash({})", self)
    }
}

macro_rules! serde_as_base58 {
    ($($ty:ty),*) => {$(
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    )*};
}

serde_as_base58!(Pubkey, Signature, Hash);

/// Durability level reached by a transaction, ordered weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationStatus {
    Processed,
    Confirmed,
    Finalized,
}

impl ConfirmationStatus {
    /// Whether this status meets or exceeds `required`.
    pub fn satisfies(self, required: ConfirmationStatus) -> bool {
        self >= required
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfirmationStatus::Processed => "processed",
            ConfirmationStatus::Confirmed => "confirmed",
            ConfirmationStatus::Finalized => "finalized",
        }
    }
}

impl FromStr for ConfirmationStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processed" => Ok(ConfirmationStatus::Processed),
            "confirmed" => Ok(ConfirmationStatus::Confirmed),
            "finalized" => Ok(ConfirmationStatus::Finalized),
            other => Err(LedgerError::Encoding(format!(
                "unknown confirmation status '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for ConfirmationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fungible token type created on the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mint {
    /// Address of the mint account.
    pub address: Pubkey,
    /// Decimal precision, `0..=9`.
    pub decimals: u8,
    /// Account allowed to mint further supply; `None` once supply is fixed.
    pub authority: Option<Pubkey>,
}

/// Observed state of a token account. A missing account reads as zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenAccountBalance {
    pub amount: u64,
    pub exists: bool,
}

/// Reject decimals outside the range the token program accepts.
pub fn check_decimals(decimals: u8) -> LedgerResult<u8> {
    if decimals > MAX_DECIMALS {
        return Err(LedgerError::InvalidDecimals(decimals));
    }
    Ok(decimals)
}

/// Scale a whole display amount to raw token units (`amount * 10^decimals`).
pub fn to_raw_amount(amount: u64, decimals: u8) -> LedgerResult<u64> {
    if amount == 0 {
        return Err(LedgerError::InvalidAmount("amount must be positive".into()));
    }
    let decimals = check_decimals(decimals)?;
    10u64
        .checked_pow(decimals as u32)
        .and_then(|scale| amount.checked_mul(scale))
        .ok_or_else(|| {
            LedgerError::InvalidAmount(format!(
                "{} with {} decimals overflows a u64",
                amount, decimals
            ))
        })
}

/// Render a raw token amount in display units, e.g. `60000000000` @ 9 → `60`.
pub fn format_token_amount(raw: u64, decimals: u8) -> String {
    if decimals == 0 {
        return raw.to_string();
    }
    let scale = 10u64.pow(decimals.min(MAX_DECIMALS) as u32);
    let whole = raw / scale;
    let frac = raw % scale;
    if frac == 0 {
        return whole.to_string();
    }
    let frac = format!("{:0width$}", frac, width = decimals as usize);
    format!("{}.{}", whole, frac.trim_end_matches('0'))
}

/// Convert lamports to SOL for display.
pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}

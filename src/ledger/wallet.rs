//! Keypairs and the signing capability.
//!
//! # Security
//! - The session's private key is loaded ONLY from an environment variable
//! - Keys are never logged or serialized
//! - Decoded key material is zeroized after use

use async_trait::async_trait;
use ed25519_dalek::Signer as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use zeroize::Zeroizing;

use crate::ledger::rpc::RpcEndpoint;
use crate::ledger::transaction::Transaction;
use crate::ledger::types::{LedgerError, LedgerResult, Pubkey, Signature};

/// Environment variable holding the session keypair.
pub const KEYPAIR_ENV_VAR: &str = "TOKEN_CONSOLE_KEYPAIR";

/// An ed25519 keypair.
pub struct Keypair(ed25519_dalek::SigningKey);

impl Keypair {
    /// Fresh random keypair from the OS RNG.
    pub fn generate() -> Self {
        Self(ed25519_dalek::SigningKey::generate(&mut rand::rngs::OsRng))
    }

    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self(ed25519_dalek::SigningKey::from_bytes(seed))
    }

    /// Parse a keypair in either of the forms the CLI tooling produces.
    ///
    /// Accepts a JSON byte array (`[12, 34, ...]`, as written by keygen) or a
    /// base58 string. Either form may hold the 32-byte seed alone or the
    /// 64-byte seed-plus-public-key layout, in which case the public half must
    /// match the seed.
    pub fn from_encoded(encoded: &str) -> LedgerResult<Self> {
        let encoded = encoded.trim();
        let bytes: Zeroizing<Vec<u8>> = if encoded.starts_with('[') {
            Zeroizing::new(
                serde_json::from_str(encoded)
                    .map_err(|e| LedgerError::Encoding(format!("invalid keypair JSON: {}", e)))?,
            )
        } else {
            Zeroizing::new(
                bs58::decode(encoded)
                    .into_vec()
                    .map_err(|e| LedgerError::Encoding(format!("invalid keypair base58: {}", e)))?,
            )
        };

        let mut seed = Zeroizing::new([0u8; 32]);
        match bytes.len() {
            32 => seed.copy_from_slice(&bytes),
            64 => {
                seed.copy_from_slice(&bytes[..32]);
                let keypair = Self::from_seed(&seed);
                if keypair.pubkey().as_bytes()[..] != bytes[32..] {
                    return Err(LedgerError::Encoding(
                        "keypair public half does not match its secret".into(),
                    ));
                }
                return Ok(keypair);
            }
            n => {
                return Err(LedgerError::Encoding(format!(
                    "keypair must be 32 or 64 bytes, got {}",
                    n
                )))
            }
        }
        Ok(Self::from_seed(&seed))
    }

    pub fn pubkey(&self) -> Pubkey {
        Pubkey::new_from_array(self.0.verifying_key().to_bytes())
    }

    pub fn sign_message(&self, message: &[u8]) -> Signature {
        Signature::new_from_array(self.0.sign(message).to_bytes())
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Keypair({})", self.pubkey())
    }
}

/// The signing capability a connected wallet provides.
#[async_trait]
pub trait Signer: Send + Sync {
    /// The connected account, or `None` when disconnected.
    fn public_key(&self) -> Option<Pubkey>;

    /// Add this account's signature and submit the transaction.
    async fn sign_and_send(&self, transaction: Transaction) -> LedgerResult<Signature>;
}

/// A [`Signer`] backed by a local keypair.
pub struct KeypairSigner {
    keypair: Keypair,
    endpoint: Arc<dyn RpcEndpoint>,
    connected: AtomicBool,
}

impl KeypairSigner {
    pub fn new(keypair: Keypair, endpoint: Arc<dyn RpcEndpoint>) -> Self {
        tracing::info!(account = %keypair.pubkey(), "Signer initialized");
        Self {
            keypair,
            endpoint,
            connected: AtomicBool::new(true),
        }
    }

    /// Load the keypair from `TOKEN_CONSOLE_KEYPAIR`.
    pub fn from_env(endpoint: Arc<dyn RpcEndpoint>) -> LedgerResult<Self> {
        let encoded = Zeroizing::new(std::env::var(KEYPAIR_ENV_VAR).map_err(|_| {
            LedgerError::Encoding(format!("Environment variable {} not set", KEYPAIR_ENV_VAR))
        })?);
        Ok(Self::new(Keypair::from_encoded(&encoded)?, endpoint))
    }

    /// Stop signing; `public_key` reports `None` afterwards.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl Signer for KeypairSigner {
    fn public_key(&self) -> Option<Pubkey> {
        self.connected
            .load(Ordering::SeqCst)
            .then(|| self.keypair.pubkey())
    }

    async fn sign_and_send(&self, mut transaction: Transaction) -> LedgerResult<Signature> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(LedgerError::NotConnected);
        }
        transaction.partial_sign(&[&self.keypair])?;
        if !transaction.is_signed() {
            return Err(LedgerError::Encoding(
                "transaction still needs signatures from other accounts".into(),
            ));
        }
        self.endpoint.send_transaction(&transaction).await
    }
}

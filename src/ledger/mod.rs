//! Ledger integration subsystem.
//!
//! # Data Flow
//! ```text
//! Environment variable (session keypair)
//!     → wallet.rs (key loading, signing capability)
//!     → programs.rs (system / token / associated account instructions)
//!     → transaction.rs (compile, sign, serialize)
//!     → client.rs (retried calls, submission, confirmation)
//!     → rpc.rs (JSON-RPC over HTTP with timeouts)
//! ```
//!
//! # Security Constraints
//! - Private keys ONLY from environment variables
//! - Never log private keys or sensitive data
//! - All RPC calls have configurable timeouts
//! - Only throttled calls are retried

pub mod client;
pub mod programs;
pub mod rpc;
pub mod transaction;
pub mod types;
pub mod wallet;

pub use client::{ConfirmationSettings, LedgerClient};
pub use rpc::{HttpRpcEndpoint, RpcEndpoint};
pub use types::{
    ConfirmationStatus, LedgerError, LedgerResult, Mint, Pubkey, Signature, TokenAccountBalance,
};
pub use wallet::{Keypair, KeypairSigner, Signer};

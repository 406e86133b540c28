//! Fungible token console for Solana clusters.

pub mod config;
pub mod ledger;
pub mod lifecycle;
pub mod observability;
pub mod polling;
pub mod resilience;
pub mod workflows;

pub use config::schema::ConsoleConfig;
pub use ledger::{LedgerClient, LedgerError, LedgerResult};
pub use lifecycle::{Session, SessionManager, Shutdown};

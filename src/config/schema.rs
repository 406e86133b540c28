//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::ledger::types::{ConfirmationStatus, LAMPORTS_PER_SOL};

/// Root configuration for the token console.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ConsoleConfig {
    /// RPC endpoint settings.
    pub rpc: RpcConfig,

    /// Retry configuration for throttled calls.
    pub retry: RetryConfig,

    /// Background poller cadence.
    pub polling: PollingConfig,

    /// Defaults for mint creation.
    pub mint: MintConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// RPC endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RpcConfig {
    /// JSON-RPC endpoint URL.
    pub url: String,

    /// Cluster name used for explorer links (devnet, testnet, mainnet-beta).
    pub cluster: String,

    /// Per-request timeout in seconds.
    pub timeout_secs: u64,

    /// Commitment a submitted transaction must reach.
    pub commitment: ConfirmationStatus,

    /// Interval between signature status checks in milliseconds.
    pub confirm_poll_interval_ms: u64,

    /// Give up waiting for confirmation after this many seconds.
    pub confirm_timeout_secs: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: "https://api.devnet.solana.com".to_string(),
            cluster: "devnet".to_string(),
            timeout_secs: 10,
            commitment: ConfirmationStatus::Confirmed,
            confirm_poll_interval_ms: 500,
            confirm_timeout_secs: 60,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds; doubles per retry.
    pub initial_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1000,
        }
    }
}

/// Poller configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Balance refresh interval in seconds.
    pub balance_interval_secs: u64,

    /// Transaction history refresh interval in seconds.
    pub history_interval_secs: u64,

    /// Number of recent transactions to show (at most 10).
    pub history_limit: usize,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            balance_interval_secs: 30,
            history_interval_secs: 30,
            history_limit: 10,
        }
    }
}

/// Mint creation defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MintConfig {
    /// Decimal precision for new mints.
    pub decimals: u8,

    /// Lamports airdropped to the throwaway mint payer.
    pub funding_lamports: u64,
}

impl Default for MintConfig {
    fn default() -> Self {
        Self {
            decimals: 9,
            funding_lamports: LAMPORTS_PER_SOL,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Pretty output for terminals, JSON for log shippers.
    pub log_format: LogFormat,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (attempts ≥ 1, intervals > 0, decimals ≤ 9)
//! - Check the RPC URL is usable
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ConsoleConfig → Result<(), Vec<ValidationError>>

use thiserror::Error;

use crate::config::schema::ConsoleConfig;
use crate::ledger::types::MAX_DECIMALS;

/// Maximum number of transactions the history view keeps.
pub const MAX_HISTORY_LIMIT: usize = 10;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("rpc.url '{url}' is invalid: {reason}")]
    InvalidRpcUrl { url: String, reason: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("mint.decimals {0} exceeds {max}", max = MAX_DECIMALS)]
    Decimals(u8),

    #[error("polling.history_limit {0} must be between 1 and {max}", max = MAX_HISTORY_LIMIT)]
    HistoryLimit(usize),

    #[error("observability.log_level '{0}' is not one of trace, debug, info, warn, error")]
    LogLevel(String),
}

/// Check a parsed config for semantic errors.
pub fn validate_config(config: &ConsoleConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match url::Url::parse(&config.rpc.url) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        Ok(url) => errors.push(ValidationError::InvalidRpcUrl {
            url: config.rpc.url.clone(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        }),
        Err(e) => errors.push(ValidationError::InvalidRpcUrl {
            url: config.rpc.url.clone(),
            reason: e.to_string(),
        }),
    }

    let positive = [
        ("rpc.timeout_secs", config.rpc.timeout_secs),
        ("rpc.confirm_poll_interval_ms", config.rpc.confirm_poll_interval_ms),
        ("rpc.confirm_timeout_secs", config.rpc.confirm_timeout_secs),
        ("retry.max_attempts", config.retry.max_attempts as u64),
        ("polling.balance_interval_secs", config.polling.balance_interval_secs),
        ("polling.history_interval_secs", config.polling.history_interval_secs),
        ("mint.funding_lamports", config.mint.funding_lamports),
    ];
    for (field, value) in positive {
        if value == 0 {
            errors.push(ValidationError::Zero { field });
        }
    }

    if config.mint.decimals > MAX_DECIMALS {
        errors.push(ValidationError::Decimals(config.mint.decimals));
    }

    if config.polling.history_limit == 0 || config.polling.history_limit > MAX_HISTORY_LIMIT {
        errors.push(ValidationError::HistoryLimit(config.polling.history_limit));
    }

    let level = config.observability.log_level.to_ascii_lowercase();
    if !["trace", "debug", "info", "warn", "error"].contains(&level.as_str()) {
        errors.push(ValidationError::LogLevel(config.observability.log_level.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

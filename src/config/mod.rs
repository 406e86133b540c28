//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ConsoleConfig (validated, immutable)
//!     → handed to LedgerClient, Session, workflows and pollers
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults so an empty file (or no file) is a valid config
//! - Validation separates syntactic (serde) from semantic checks
//! - Secrets never live in the file; the signing key comes from the environment

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::ConsoleConfig;
pub use schema::MintConfig;
pub use schema::ObservabilityConfig;
pub use schema::PollingConfig;
pub use schema::RetryConfig;
pub use schema::RpcConfig;

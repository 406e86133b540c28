//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Connect (session.rs):
//!     Signer → Session::activate → optional start_polling
//!
//! Disconnect (session.rs + shutdown.rs):
//!     deactivate → trigger Shutdown → stop pollers → abandon in-flight workflows
//!
//! Process exit (main.rs):
//!     Ctrl-C → SessionManager::disconnect
//! ```
//!
//! # Design Decisions
//! - At most one active session; connecting a new account deactivates the old one first
//! - Pollers are stopped and joined before the next session starts
//! - Published snapshots carry the session id they belong to

pub mod session;
pub mod shutdown;

pub use session::{PollingFeeds, Session, SessionManager, SessionSettings};
pub use shutdown::Shutdown;

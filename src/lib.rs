//! Chaintrace - Supply-Chain Ledger Transaction Client
//!
//! A client library that records supply-chain state transitions (product
//! creation, status changes, tracking events) on an append-only ledger and
//! reconstructs product history from the ledger's confirmed record. Handles
//! per-identity sequence allocation, deterministic signing, submission with
//! bounded retries, and confirmation polling against the ledger node.

pub mod config;
pub mod error;
pub mod ledger;
pub mod monitoring;
pub mod product;
pub mod signer;

// Re-export commonly used types
pub use config::Config;
pub use error::{ChainTraceError, Result};
pub use ledger::service::LedgerService;
pub use ledger::{TransactionRecord, TransactionStatus};
pub use product::{ProductStatus, TrackingEvent};

/// Client version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    /// Default upper bound on computation units per transaction
    pub const GAS_LIMIT: u64 = 2_000_000;

    /// Default ledger chain identifier
    pub const CHAIN_ID: u64 = 1;

    /// Default RPC request timeout
    pub const RPC_TIMEOUT: Duration = Duration::from_secs(10);

    /// Default total confirmation-wait budget per submission
    pub const CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(120);

    /// Default initial delay between receipt polls
    pub const POLL_INITIAL_DELAY: Duration = Duration::from_millis(500);

    /// Default cap on the receipt poll delay
    pub const POLL_MAX_DELAY: Duration = Duration::from_secs(8);

    /// Default maximum identical-envelope resends after transient failures
    pub const MAX_SUBMIT_RETRIES: u32 = 3;

    /// Default number of history entries fetched per read call
    pub const HISTORY_PAGE_SIZE: usize = 100;
}

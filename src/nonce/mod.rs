//! Nonce Module
//!
//! Replay protection: a per-owner ledger of accepted nonces with TTL expiry
//! and optional strict numeric ordering.

mod config;
mod ledger;
mod record;
mod shared;
mod stats;


// Re-export public types
pub use config::NonceConfig;
pub use ledger::NonceLedger;
pub use record::NonceRecord;
pub use shared::SharedNonceLedger;
pub use stats::NonceValidatorStats;

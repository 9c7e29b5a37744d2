//! Background Tasks Module
//!
//! Periodic maintenance that runs beside the guard components.
//!
//! # Tasks
//! - Nonce sweep: drops ledger records older than the replay window
//! - Cache prune: drops expired cache entries
//! - Key rotation: replaces the response-signing key

mod periodic;

pub use periodic::{spawn_periodic, PeriodicTask};

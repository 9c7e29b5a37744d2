//! Proof Guard - replay protection and integrity checks for proof services
//!
//! Nonce ledger, detached-signature verification, HMAC response signing with
//! key rotation, a bounded verification cache and retry/checkpoint recovery,
//! plus an HTTP sidecar composing them.

pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod models;
pub mod nonce;
pub mod recovery;
pub mod signature;
pub mod tasks;

pub use api::{create_router, AppState};
pub use cache::{BoundedCache, CacheConfig, SetOptions, SharedCache};
pub use clock::{ClockSource, ManualClock, SharedClock, SystemClock};
pub use config::Config;
pub use error::{GuardError, ReasonCode, Result, VerificationResult};
pub use nonce::{NonceConfig, NonceLedger, SharedNonceLedger};
pub use recovery::{RecoveryOrchestrator, RetryPolicy};
pub use signature::{ResponseSigner, SharedResponseSigner, SignatureVerifier};

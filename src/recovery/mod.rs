//! Recovery Module
//!
//! Retry with backoff for transient failures, and checkpoint/resume for
//! long multi-step operations.

mod backoff;
mod checkpoint;
mod orchestrator;
mod policy;

// Re-export public types
pub use backoff::BackoffConfig;
pub use checkpoint::{Checkpoint, CheckpointStore, MemoryCheckpointStore};
pub use orchestrator::{RecoveryError, RecoveryOrchestrator, RecoveryStats};
pub use policy::{RetryPolicy, Retryable};

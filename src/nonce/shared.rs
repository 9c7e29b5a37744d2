//! Shared Nonce Ledger
//!
//! Lock-guarded ledger handle for concurrent request handlers, plus the
//! periodic sweep.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::RwLock;
use tracing::info;

use crate::error::VerificationResult;
use crate::nonce::{NonceLedger, NonceValidatorStats};
use crate::tasks::{spawn_periodic, PeriodicTask};

/// Cloneable handle to a ledger shared across tasks.
///
/// Every mutation runs under the write lock, so check-then-insert in
/// `validate` cannot interleave with another validation or a sweep.
#[derive(Debug, Clone)]
pub struct SharedNonceLedger {
    ledger: Arc<RwLock<NonceLedger>>,
    sweeper: Arc<Mutex<Option<PeriodicTask>>>,
}

impl SharedNonceLedger {
    /// Wraps a ledger for shared use.
    pub fn new(ledger: NonceLedger) -> Self {
        Self {
            ledger: Arc::new(RwLock::new(ledger)),
            sweeper: Arc::new(Mutex::new(None)),
        }
    }

    /// See [`NonceLedger::validate`].
    pub async fn validate(
        &self,
        nonce: &str,
        owner_id: &str,
        timestamp_ms: Option<u64>,
    ) -> VerificationResult {
        self.ledger
            .write()
            .await
            .validate(nonce, owner_id, timestamp_ms)
    }

    /// See [`NonceLedger::sweep_expired`].
    pub async fn sweep_expired(&self) -> usize {
        self.ledger.write().await.sweep_expired()
    }

    /// See [`NonceLedger::stats`].
    pub async fn stats(&self) -> NonceValidatorStats {
        self.ledger.read().await.stats()
    }

    /// See [`NonceLedger::reset`].
    pub async fn reset(&self) {
        self.ledger.write().await.reset();
    }

    // == Periodic Sweep ==
    /// Starts the background sweep at the configured interval.
    ///
    /// Does nothing if a sweep is already running.
    pub async fn start_sweeping(&self) {
        let interval = self.ledger.read().await.config().sweep_interval;
        let mut sweeper = self.sweeper.lock().unwrap_or_else(PoisonError::into_inner);
        if sweeper.as_ref().is_some_and(PeriodicTask::is_running) {
            return;
        }

        let ledger = self.ledger.clone();
        *sweeper = Some(spawn_periodic("nonce sweep", interval, move || {
            let ledger = ledger.clone();
            async move { ledger.write().await.sweep_expired() }
        }));
    }

    /// Returns true while the background sweep is running.
    pub fn is_sweeping(&self) -> bool {
        self.sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(PeriodicTask::is_running)
    }

    // == Dispose ==
    /// Stops the sweep and clears all state. Safe to call more than once.
    pub async fn dispose(&self) {
        let task = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.stop();
        }
        self.reset().await;
        info!("Nonce ledger disposed");
    }
}

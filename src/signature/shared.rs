//! Shared Response Signer
//!
//! Lock-guarded signer handle with the background rotation timer.

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::info;

use crate::error::{Result, VerificationResult};
use crate::signature::{ResponseSigner, SignerStats};
use crate::tasks::{spawn_periodic, PeriodicTask};

/// Cloneable handle to a signer shared across tasks.
#[derive(Debug, Clone)]
pub struct SharedResponseSigner {
    signer: Arc<RwLock<ResponseSigner>>,
    rotation: Arc<Mutex<Option<PeriodicTask>>>,
}

impl SharedResponseSigner {
    /// Wraps a signer for shared use.
    pub fn new(signer: ResponseSigner) -> Self {
        Self {
            signer: Arc::new(RwLock::new(signer)),
            rotation: Arc::new(Mutex::new(None)),
        }
    }

    /// See [`ResponseSigner::sign_response`].
    pub async fn sign_response(&self, data: Value) -> Result<Value> {
        self.signer.write().await.sign_response(data)
    }

    /// See [`ResponseSigner::verify_response`].
    pub async fn verify_response(&self, data: &Value) -> VerificationResult {
        self.signer.write().await.verify_response(data)
    }

    /// See [`ResponseSigner::rotate`].
    pub async fn rotate(&self) {
        self.signer.write().await.rotate();
    }

    /// See [`ResponseSigner::stats`].
    pub async fn stats(&self) -> SignerStats {
        self.signer.read().await.stats()
    }

    // == Rotation Timer ==
    /// Starts rotating the key every configured interval.
    ///
    /// Does nothing if rotation is already running.
    pub async fn start_rotation(&self) {
        let interval = self.signer.read().await.config().rotation_interval;
        let mut rotation = self.rotation.lock().unwrap_or_else(PoisonError::into_inner);
        if rotation.as_ref().is_some_and(PeriodicTask::is_running) {
            return;
        }

        let signer = self.signer.clone();
        *rotation = Some(spawn_periodic("key rotation", interval, move || {
            let signer = signer.clone();
            async move {
                signer.write().await.rotate();
                1
            }
        }));
    }

    /// Returns true while the rotation timer is running.
    pub fn is_rotating(&self) -> bool {
        self.rotation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(PeriodicTask::is_running)
    }

    // == Destroy ==
    /// Stops the rotation timer. Safe to call more than once.
    pub fn destroy(&self) {
        let task = self
            .rotation
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.stop();
            info!("Response signer destroyed");
        }
    }
}

//! API Handlers
//!
//! HTTP request handlers for each guard sidecar endpoint.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{extract::State, Json};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::cache::{fingerprint, BoundedCache, SetOptions, SharedCache};
use crate::clock::{SharedClock, SystemClock};
use crate::config::Config;
use crate::error::{GuardError, Result, VerificationResult};
use crate::models::{
    HealthResponse, RegisterKeyRequest, RegisterKeyResponse, StatsResponse, VerifyRequest,
    VerifyResponse,
};
use crate::nonce::{NonceLedger, SharedNonceLedger};
use crate::signature::{ResponseSigner, SharedResponseSigner, SignatureVerifier};

/// Application state shared across all handlers.
///
/// Every component sits behind its own lock, so a slow signature check never
/// blocks nonce validation for another request.
#[derive(Clone)]
pub struct AppState {
    /// Replay ledger
    pub nonces: SharedNonceLedger,
    /// Registered verifying keys
    pub verifier: Arc<RwLock<SignatureVerifier>>,
    /// Memoised signature verdicts, tagged with the key registration they were made with
    pub verdicts: SharedCache<String, VerificationResult>,
    /// Outbound response signer
    pub signer: SharedResponseSigner,
}

impl AppState {
    /// Creates a new AppState from its components.
    pub fn new(
        nonces: NonceLedger,
        verifier: SignatureVerifier,
        verdicts: BoundedCache<String, VerificationResult>,
        signer: ResponseSigner,
    ) -> Self {
        Self {
            nonces: SharedNonceLedger::new(nonces),
            verifier: Arc::new(RwLock::new(verifier)),
            verdicts: SharedCache::new(verdicts),
            signer: SharedResponseSigner::new(signer),
        }
    }

    /// Creates a new AppState from configuration on the system clock.
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::with_clock(config, SystemClock::shared())
    }

    /// Creates a new AppState from configuration on the given clock.
    pub fn with_clock(config: &Config, clock: SharedClock) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(
            NonceLedger::new(config.nonce.clone(), clock.clone())?,
            SignatureVerifier::new(config.verifier.clone())?,
            BoundedCache::new(config.cache.clone(), clock.clone())?,
            ResponseSigner::new(config.signer.clone(), clock)?,
        ))
    }

    /// Starts the nonce sweep, cache prune and key rotation timers.
    pub async fn start_background_tasks(&self) {
        self.nonces.start_sweeping().await;
        self.verdicts.start_pruning().await;
        self.signer.start_rotation().await;
    }

    /// Stops every background timer and drops all in-memory state.
    pub async fn shutdown(&self) {
        self.nonces.dispose().await;
        self.verdicts.destroy().await;
        self.signer.destroy();
    }
}

// == Verdict Keys ==
/// Cache version for verdicts made against `key_id` at `epoch`.
///
/// Epoch 0 stands for "no key registered".
fn verdict_version(key_id: &str, epoch: u64) -> String {
    format!("{key_id}#{epoch}")
}

/// Where a request's signature verdict lives in the verdict cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct VerdictKey {
    /// Resolved verifying key id
    pub key_id: String,
    /// `key_id` plus the epoch of its registration
    pub version: String,
    /// Fingerprint of key, epoch, signature and signed envelope
    pub cache_key: String,
}

impl VerdictKey {
    /// Resolves the key for `req` against the keys registered right now.
    ///
    /// The registration epoch is part of the cache key, so a verdict made
    /// against a replaced key is never looked up again.
    pub(crate) fn resolve(verifier: &SignatureVerifier, req: &VerifyRequest) -> Result<Self> {
        let key_id = verifier.resolve_key_id(req.key_id.as_deref()).to_string();
        let epoch = verifier.key_epoch(&key_id).unwrap_or(0);
        let cache_key = fingerprint(
            &json!({"keyId": key_id, "epoch": epoch, "signature": req.signature}),
            &req.envelope(),
        )?;
        Ok(Self {
            version: verdict_version(&key_id, epoch),
            key_id,
            cache_key,
        })
    }
}

/// Handler for PUT /keys
///
/// Registers a verifying key. Verdicts cached under the previous
/// registration of the same id are invalidated.
pub async fn register_key_handler(
    State(state): State<AppState>,
    Json(req): Json<RegisterKeyRequest>,
) -> Result<Json<RegisterKeyResponse>> {
    // Validate request
    if let Some(error_msg) = req.validate() {
        return Err(GuardError::InvalidRequest(error_msg));
    }

    let previous_epoch = {
        let mut verifier = state.verifier.write().await;
        let previous_epoch = verifier.key_epoch(&req.key_id).unwrap_or(0);
        verifier.register_key(&req.key_id, &req.public_key)?;
        previous_epoch
    };
    let invalidated = state
        .verdicts
        .invalidate_version(&verdict_version(&req.key_id, previous_epoch))
        .await;

    Ok(Json(RegisterKeyResponse::new(req.key_id, invalidated)))
}

/// Handler for POST /requests/verify
///
/// Checks the signature over the request envelope (memoised by fingerprint),
/// then burns the nonce. Either rejection answers 401 with a generic body;
/// the accepted response is signed.
pub async fn verify_request_handler(
    State(state): State<AppState>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<Value>> {
    // Validate request
    if let Some(error_msg) = req.validate() {
        return Err(GuardError::InvalidRequest(error_msg));
    }

    let VerdictKey {
        key_id,
        version,
        cache_key,
    } = VerdictKey::resolve(&*state.verifier.read().await, &req)?;
    let envelope = req.envelope();

    let mut computed = false;
    let verifier = state.verifier.clone();
    let verdict = state
        .verdicts
        .get_or_compute(cache_key, SetOptions::new().version(version), || {
            computed = true;
            let (envelope, signature, key_id) = (&envelope, &req.signature, &key_id);
            async move {
                let verdict = verifier.read().await.verify_with_details(
                    envelope,
                    signature,
                    Some(key_id.as_str()),
                );
                Ok::<_, Infallible>(verdict)
            }
        })
        .await
        .unwrap_or_else(|never| match never {});

    if !verdict.valid {
        warn!(
            "Rejected request from '{}': {:?} ({})",
            req.owner_id, verdict.reason, verdict.message
        );
        return Err(GuardError::Rejected(verdict));
    }

    let nonce_result = state
        .nonces
        .validate(&req.nonce, &req.owner_id, req.timestamp_ms)
        .await;
    if !nonce_result.valid {
        return Err(GuardError::Rejected(nonce_result));
    }

    let body = serde_json::to_value(VerifyResponse::accepted(
        req.owner_id,
        req.nonce,
        key_id,
        !computed,
    ))?;
    let signed = state.signer.sign_response(body).await?;

    Ok(Json(signed))
}

/// Handler for POST /responses/verify
///
/// Checks a response previously signed by this sidecar.
pub async fn verify_response_handler(
    State(state): State<AppState>,
    Json(data): Json<Value>,
) -> Json<VerificationResult> {
    let result = state.signer.verify_response(&data).await;
    if !result.valid {
        info!("Response verification failed: {:?}", result.reason);
    }
    Json(result)
}

/// Handler for GET /stats
///
/// Returns nonce, cache and signer statistics.
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    let registered_keys = state.verifier.read().await.key_count();

    Json(StatsResponse {
        nonces: state.nonces.stats().await,
        cache: state.verdicts.stats().await,
        signer: state.signer.stats().await,
        registered_keys,
    })
}

/// Handler for GET /health
///
/// Returns health status of the server.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

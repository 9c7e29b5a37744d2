//! Response DTOs for the guard sidecar API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::CacheStats;
use crate::nonce::NonceValidatorStats;
use crate::signature::SignerStats;

/// Body of an accepted request (POST /requests/verify), signed before it
/// leaves the sidecar
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    /// Always true; rejections never produce this body
    pub valid: bool,
    pub owner_id: String,
    pub nonce: String,
    /// Key the signature was checked against
    pub key_id: String,
    /// Whether the signature verdict came from the cache
    pub cached: bool,
}

impl VerifyResponse {
    /// Creates an acceptance body
    pub fn accepted(
        owner_id: impl Into<String>,
        nonce: impl Into<String>,
        key_id: impl Into<String>,
        cached: bool,
    ) -> Self {
        Self {
            valid: true,
            owner_id: owner_id.into(),
            nonce: nonce.into(),
            key_id: key_id.into(),
            cached,
        }
    }
}

/// Response body for key registration (PUT /keys)
#[derive(Debug, Clone, Serialize)]
pub struct RegisterKeyResponse {
    /// Success message
    pub message: String,
    /// The key id that was registered
    pub key_id: String,
    /// Cached verdicts dropped because they were made with the old key
    pub invalidated: usize,
}

impl RegisterKeyResponse {
    /// Creates a new RegisterKeyResponse
    pub fn new(key_id: impl Into<String>, invalidated: usize) -> Self {
        let key_id = key_id.into();
        Self {
            message: format!("Key '{}' registered successfully", key_id),
            key_id,
            invalidated,
        }
    }
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Replay ledger counters
    pub nonces: NonceValidatorStats,
    /// Verdict cache counters
    pub cache: CacheStats,
    /// Response signer counters
    pub signer: SignerStats,
    /// Number of registered verifying keys
    pub registered_keys: usize,
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

//! Error types for the guard
//!
//! Expected rejections travel as [`VerificationResult`] values; faults and
//! misconfiguration are [`GuardError`]s built with thiserror.

use std::fmt;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

// == Reason Code ==
/// Why a nonce, signature or cache operation was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    /// Nonce is empty, too short, too long or contains illegal characters
    InvalidFormat,
    /// Timestamp lies beyond the allowed clock skew
    FutureTimestamp,
    /// Timestamp is older than the replay window
    Expired,
    /// Nonce was already accepted for this owner
    AlreadyUsed,
    /// Numeric nonce below the owner's high-water mark
    OutOfOrder,
    /// Response carries no signature fields
    MissingSignature,
    /// Signature does not match the payload
    InvalidSignature,
    /// No verifying key is registered under the requested id
    NoKeyRegistered,
    /// Value cannot fit inside the cache budget
    CacheOverBudget,
    /// Construction-time configuration is unusable
    ConfigInvalid,
}

impl ReasonCode {
    /// Every reason code, in declaration order.
    pub const ALL: [ReasonCode; 10] = [
        ReasonCode::InvalidFormat,
        ReasonCode::FutureTimestamp,
        ReasonCode::Expired,
        ReasonCode::AlreadyUsed,
        ReasonCode::OutOfOrder,
        ReasonCode::MissingSignature,
        ReasonCode::InvalidSignature,
        ReasonCode::NoKeyRegistered,
        ReasonCode::CacheOverBudget,
        ReasonCode::ConfigInvalid,
    ];

    /// Wire name of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::InvalidFormat => "INVALID_FORMAT",
            ReasonCode::FutureTimestamp => "FUTURE_TIMESTAMP",
            ReasonCode::Expired => "EXPIRED",
            ReasonCode::AlreadyUsed => "ALREADY_USED",
            ReasonCode::OutOfOrder => "OUT_OF_ORDER",
            ReasonCode::MissingSignature => "MISSING_SIGNATURE",
            ReasonCode::InvalidSignature => "INVALID_SIGNATURE",
            ReasonCode::NoKeyRegistered => "NO_KEY_REGISTERED",
            ReasonCode::CacheOverBudget => "CACHE_OVER_BUDGET",
            ReasonCode::ConfigInvalid => "CONFIG_INVALID",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// == Verification Result ==
/// Outcome of a nonce or signature check. Immutable once returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    /// Whether the check passed
    pub valid: bool,
    /// Reason for a failed check, `None` when valid
    #[serde(rename = "reasonCode", skip_serializing_if = "Option::is_none")]
    pub reason: Option<ReasonCode>,
    /// Human-readable detail for logs
    pub message: String,
}

impl VerificationResult {
    /// A passing result.
    pub fn accepted() -> Self {
        Self {
            valid: true,
            reason: None,
            message: String::new(),
        }
    }

    /// A failing result with the given reason.
    pub fn rejected(reason: ReasonCode, message: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason),
            message: message.into(),
        }
    }

    /// Whether the check passed.
    pub fn is_valid(&self) -> bool {
        self.valid
    }
}

// == Guard Error ==
/// Faults raised by guard components.
#[derive(Error, Debug)]
pub enum GuardError {
    /// Configuration rejected at construction time
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Key material could not be decoded
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Request body failed validation
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Payload could not be serialized into its canonical form
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Request failed replay or tamper checks
    #[error("Request rejected: {0:?}")]
    Rejected(VerificationResult),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GuardError {
    /// Maps the error onto the reason taxonomy.
    pub fn kind(&self) -> ReasonCode {
        match self {
            GuardError::InvalidConfig(_) | GuardError::InvalidKey(_) => ReasonCode::ConfigInvalid,
            GuardError::InvalidRequest(_) | GuardError::Serialization(_) => {
                ReasonCode::InvalidFormat
            }
            GuardError::Rejected(result) => result.reason.unwrap_or(ReasonCode::InvalidSignature),
            GuardError::Internal(_) => ReasonCode::ConfigInvalid,
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for GuardError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            // Callers only learn that the request was refused.
            GuardError::Rejected(_) => (StatusCode::UNAUTHORIZED, "request rejected".to_string()),
            GuardError::InvalidConfig(msg)
            | GuardError::InvalidKey(msg)
            | GuardError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            GuardError::Serialization(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            GuardError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the guard.
pub type Result<T> = std::result::Result<T, GuardError>;

//! Request DTOs for the guard sidecar API
//!
//! Defines the structure of incoming HTTP request bodies.

use serde::Deserialize;
use serde_json::{json, Value};

const MAX_ID_LENGTH: usize = 256;

fn check_id(field: &str, value: &str) -> Option<String> {
    if value.trim().is_empty() {
        return Some(format!("{} cannot be empty", field));
    }
    if value.len() > MAX_ID_LENGTH {
        return Some(format!(
            "{} exceeds maximum length of {} characters",
            field, MAX_ID_LENGTH
        ));
    }
    None
}

/// Request body for key registration (PUT /keys)
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterKeyRequest {
    /// Id callers will reference in `key_id`
    pub key_id: String,
    /// Public key in the verifier's configured encoding
    pub public_key: String,
}

impl RegisterKeyRequest {
    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid.
    pub fn validate(&self) -> Option<String> {
        check_id("key_id", &self.key_id).or_else(|| {
            self.public_key
                .trim()
                .is_empty()
                .then(|| "public_key cannot be empty".to_string())
        })
    }
}

/// Builds the document a client signs for POST /requests/verify.
///
/// The signature covers the nonce, owner and timestamp together with the
/// payload; an absent timestamp is signed as `null`.
pub fn signing_envelope(
    payload: &Value,
    nonce: &str,
    owner_id: &str,
    timestamp_ms: Option<u64>,
) -> Value {
    json!({
        "payload": payload,
        "nonce": nonce,
        "ownerId": owner_id,
        "timestampMs": timestamp_ms,
    })
}

/// Request body for inbound request verification (POST /requests/verify)
#[derive(Debug, Clone, Deserialize)]
pub struct VerifyRequest {
    /// Application payload
    pub payload: Value,
    /// Detached signature over [`signing_envelope`] of this request
    pub signature: String,
    /// Verifying key id; the configured default when absent
    #[serde(default)]
    pub key_id: Option<String>,
    /// Single-use request token
    pub nonce: String,
    /// Owner the nonce belongs to
    pub owner_id: String,
    /// Client timestamp in Unix milliseconds; server time when absent
    #[serde(default)]
    pub timestamp_ms: Option<u64>,
}

impl VerifyRequest {
    /// The signed document for this request.
    pub fn envelope(&self) -> Value {
        signing_envelope(
            &self.payload,
            &self.nonce,
            &self.owner_id,
            self.timestamp_ms,
        )
    }

    /// Validates the request data
    ///
    /// Returns an error message if validation fails, None if valid. Nonce
    /// format is left to the ledger so it is counted as a rejection.
    pub fn validate(&self) -> Option<String> {
        if self.signature.trim().is_empty() {
            return Some("signature cannot be empty".to_string());
        }
        check_id("owner_id", &self.owner_id)
            .or_else(|| self.key_id.as_deref().and_then(|id| check_id("key_id", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_request_deserialize() {
        let json = r#"{
            "payload": {"action": "transfer"},
            "signature": "c2ln",
            "nonce": "abc123",
            "owner_id": "alice"
        }"#;
        let req: VerifyRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.owner_id, "alice");
        assert_eq!(req.payload["action"], "transfer");
        assert!(req.key_id.is_none());
        assert!(req.timestamp_ms.is_none());
        assert!(req.validate().is_none());
    }

    #[test]
    fn test_verify_request_with_optional_fields() {
        let json = r#"{
            "payload": "raw",
            "signature": "c2ln",
            "key_id": "client-1",
            "nonce": "abc123",
            "owner_id": "alice",
            "timestamp_ms": 1700000000000
        }"#;
        let req: VerifyRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.key_id.as_deref(), Some("client-1"));
        assert_eq!(req.timestamp_ms, Some(1_700_000_000_000));
    }

    #[test]
    fn test_envelope_binds_replay_fields() {
        let req: VerifyRequest = serde_json::from_str(
            r#"{"payload": {"a": 1}, "signature": "c2ln", "nonce": "abc123", "owner_id": "alice"}"#,
        )
        .unwrap();

        assert_eq!(
            req.envelope(),
            json!({"payload": {"a": 1}, "nonce": "abc123", "ownerId": "alice", "timestampMs": null})
        );
        assert_ne!(
            req.envelope(),
            signing_envelope(&req.payload, "abc124", "alice", None)
        );
        assert_ne!(
            req.envelope(),
            signing_envelope(&req.payload, "abc123", "bob", None)
        );
        assert_ne!(
            req.envelope(),
            signing_envelope(&req.payload, "abc123", "alice", Some(1))
        );
    }

    #[test]
    fn test_validate_empty_owner() {
        let req = VerifyRequest {
            payload: Value::Null,
            signature: "c2ln".to_string(),
            key_id: None,
            nonce: "abc123".to_string(),
            owner_id: " ".to_string(),
            timestamp_ms: None,
        };
        assert!(req.validate().is_some());
    }

    #[test]
    fn test_validate_register_key() {
        let valid = RegisterKeyRequest {
            key_id: "client-1".to_string(),
            public_key: "AAAA".to_string(),
        };
        assert!(valid.validate().is_none());

        let long_id = RegisterKeyRequest {
            key_id: "k".repeat(257),
            public_key: "AAAA".to_string(),
        };
        assert!(long_id.validate().is_some());

        let no_key = RegisterKeyRequest {
            key_id: "client-1".to_string(),
            public_key: String::new(),
        };
        assert!(no_key.validate().is_some());
    }
}

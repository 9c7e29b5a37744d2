//! Response Signer Module
//!
//! HMAC-SHA256 integrity signatures on outbound responses, with periodic key
//! rotation and a one-interval grace window for the previous key.

use std::fmt;
use std::time::Duration;

use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::Serialize;
use serde_json::{json, Map, Value};
use sha2::Sha256;
use tracing::{debug, info, warn};

use crate::clock::{duration_ms, SharedClock};
use crate::error::{GuardError, ReasonCode, Result, VerificationResult};
use crate::signature::canonical::canonical_bytes;

type HmacSha256 = Hmac<Sha256>;

/// Field carrying the hex HMAC.
pub const SIGNATURE_FIELD: &str = "signature";
/// Field carrying the signing time in Unix milliseconds.
pub const TIMESTAMP_FIELD: &str = "signatureTimestamp";
/// Field naming the MAC algorithm.
pub const ALGORITHM_FIELD: &str = "signatureAlgorithm";
/// Value written to [`ALGORITHM_FIELD`].
pub const HMAC_SHA256: &str = "HMAC-SHA256";

const MIN_KEY_LENGTH: usize = 16;

/// Response signer configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct ResponseSignerConfig {
    /// Time between key rotations
    pub rotation_interval: Duration,
    /// Length in bytes of generated keys
    pub key_length: usize,
    /// Shared secret to start from instead of a random key
    pub initial_key: Option<Vec<u8>>,
}

impl Default for ResponseSignerConfig {
    fn default() -> Self {
        Self {
            rotation_interval: Duration::from_secs(24 * 60 * 60),
            key_length: 32,
            initial_key: None,
        }
    }
}

impl fmt::Debug for ResponseSignerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseSignerConfig")
            .field("rotation_interval", &self.rotation_interval)
            .field("key_length", &self.key_length)
            .field("initial_key", &self.initial_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl ResponseSignerConfig {
    /// Checks the configuration for values the signer cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.rotation_interval.is_zero() {
            return Err(GuardError::InvalidConfig(
                "rotation_interval must be greater than zero".to_string(),
            ));
        }
        if self.key_length < MIN_KEY_LENGTH {
            return Err(GuardError::InvalidConfig(format!(
                "key_length must be at least {} bytes",
                MIN_KEY_LENGTH
            )));
        }
        if let Some(key) = &self.initial_key {
            if key.len() < MIN_KEY_LENGTH {
                return Err(GuardError::InvalidConfig(format!(
                    "initial_key must be at least {} bytes",
                    MIN_KEY_LENGTH
                )));
            }
        }
        Ok(())
    }
}

// == Signing Key Material ==
/// Current HMAC key plus the key it replaced.
pub struct SigningKeyMaterial {
    current_key: Vec<u8>,
    previous_key: Option<Vec<u8>>,
    /// When the current key was generated (Unix milliseconds)
    pub generated_at_ms: u64,
}

impl SigningKeyMaterial {
    fn new(current_key: Vec<u8>, generated_at_ms: u64) -> Self {
        Self {
            current_key,
            previous_key: None,
            generated_at_ms,
        }
    }

    /// Returns true while a previous key is retained.
    pub fn has_previous(&self) -> bool {
        self.previous_key.is_some()
    }
}

impl fmt::Debug for SigningKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyMaterial")
            .field("current_key", &"<redacted>")
            .field("previous_key", &self.previous_key.as_ref().map(|_| "<redacted>"))
            .field("generated_at_ms", &self.generated_at_ms)
            .finish()
    }
}

// == Signer Stats ==
/// Counters for signing and verification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SignerStats {
    /// Responses signed
    pub signed: u64,
    /// Responses passed through unsigned (errors, non-objects)
    pub skipped: u64,
    /// Responses that verified
    pub verified: u64,
    /// Responses that failed verification
    pub rejected: u64,
    /// Verifications satisfied only by the previous key
    pub previous_key_hits: u64,
    /// Key rotations performed
    pub rotations: u64,
    /// When the current key was generated (Unix milliseconds)
    pub key_generated_at_ms: u64,
}

// == Response Signer ==
/// Signs success responses and verifies them on the way back.
#[derive(Debug)]
pub struct ResponseSigner {
    keys: SigningKeyMaterial,
    stats: SignerStats,
    config: ResponseSignerConfig,
    clock: SharedClock,
}

impl ResponseSigner {
    // == Constructor ==
    /// Creates a signer, failing fast on unusable configuration.
    pub fn new(config: ResponseSignerConfig, clock: SharedClock) -> Result<Self> {
        config.validate()?;
        let key = match &config.initial_key {
            Some(key) => key.clone(),
            None => generate_key(config.key_length),
        };
        let now = clock.now_ms();

        Ok(Self {
            keys: SigningKeyMaterial::new(key, now),
            stats: SignerStats {
                key_generated_at_ms: now,
                ..SignerStats::default()
            },
            config,
            clock,
        })
    }

    // == Sign Response ==
    /// Returns `data` with `signature`, `signatureTimestamp` and
    /// `signatureAlgorithm` attached.
    ///
    /// Error responses and non-object values are returned unchanged. Any
    /// signature fields already present are replaced.
    pub fn sign_response(&mut self, data: Value) -> Result<Value> {
        if is_error_response(&data) {
            debug!("Skipping signature on error response");
            self.stats.skipped += 1;
            return Ok(data);
        }
        let mut fields = match data {
            Value::Object(fields) => fields,
            other => {
                debug!("Skipping signature on non-object response");
                self.stats.skipped += 1;
                return Ok(other);
            }
        };

        strip_signature_fields(&mut fields);
        let timestamp = self.clock.now_ms();
        let message = signing_message(&fields, timestamp)?;
        let signature = compute_mac(&self.keys.current_key, &message)?;

        fields.insert(SIGNATURE_FIELD.to_string(), Value::String(hex::encode(signature)));
        fields.insert(TIMESTAMP_FIELD.to_string(), json!(timestamp));
        fields.insert(ALGORITHM_FIELD.to_string(), json!(HMAC_SHA256));

        self.stats.signed += 1;
        Ok(Value::Object(fields))
    }

    // == Verify Response ==
    /// Checks the signature on a response produced by [`Self::sign_response`].
    ///
    /// A mismatch against the current key is retried once against the
    /// previous key while it is inside its grace window.
    pub fn verify_response(&mut self, data: &Value) -> VerificationResult {
        let result = self.check_response(data);
        if result.valid {
            self.stats.verified += 1;
        } else {
            self.stats.rejected += 1;
        }
        result
    }

    fn check_response(&mut self, data: &Value) -> VerificationResult {
        let Some(fields) = data.as_object() else {
            return VerificationResult::rejected(
                ReasonCode::MissingSignature,
                "response is not an object",
            );
        };
        let signature = fields.get(SIGNATURE_FIELD).and_then(Value::as_str);
        let timestamp = fields.get(TIMESTAMP_FIELD).and_then(Value::as_u64);
        let (Some(signature), Some(timestamp)) = (signature, timestamp) else {
            return VerificationResult::rejected(
                ReasonCode::MissingSignature,
                "response carries no signature",
            );
        };

        if let Some(algorithm) = fields.get(ALGORITHM_FIELD) {
            if algorithm.as_str() != Some(HMAC_SHA256) {
                return VerificationResult::rejected(
                    ReasonCode::InvalidSignature,
                    format!("unsupported signature algorithm {}", algorithm),
                );
            }
        }

        let Ok(expected) = hex::decode(signature) else {
            return VerificationResult::rejected(
                ReasonCode::InvalidSignature,
                "signature is not hex",
            );
        };

        let mut stripped = fields.clone();
        strip_signature_fields(&mut stripped);
        let message = match signing_message(&stripped, timestamp) {
            Ok(message) => message,
            Err(e) => return VerificationResult::rejected(ReasonCode::InvalidFormat, e.to_string()),
        };

        if mac_matches(&self.keys.current_key, &message, &expected) {
            return VerificationResult::accepted();
        }

        if let Some(previous) = self.previous_key_in_grace() {
            if mac_matches(previous, &message, &expected) {
                self.stats.previous_key_hits += 1;
                return VerificationResult::accepted();
            }
        }

        warn!("Response signature verification failed");
        VerificationResult::rejected(ReasonCode::InvalidSignature, "signature mismatch")
    }

    fn previous_key_in_grace(&self) -> Option<&[u8]> {
        let previous = self.keys.previous_key.as_deref()?;
        let grace_ends = self
            .keys
            .generated_at_ms
            .saturating_add(duration_ms(self.config.rotation_interval));
        (self.clock.now_ms() < grace_ends).then_some(previous)
    }

    // == Rotate ==
    /// Replaces the current key with a fresh random key.
    ///
    /// The outgoing key is kept as the previous key; whatever was previous
    /// before is discarded.
    pub fn rotate(&mut self) {
        let fresh = generate_key(self.config.key_length);
        let outgoing = std::mem::replace(&mut self.keys.current_key, fresh);
        self.keys.previous_key = Some(outgoing);
        self.keys.generated_at_ms = self.clock.now_ms();

        self.stats.rotations += 1;
        self.stats.key_generated_at_ms = self.keys.generated_at_ms;
        info!("Response signing key rotated ({} rotations)", self.stats.rotations);
    }

    // == Stats ==
    /// Returns signing statistics.
    pub fn stats(&self) -> SignerStats {
        self.stats.clone()
    }

    /// Key material metadata (keys themselves are never exposed).
    pub fn key_material(&self) -> &SigningKeyMaterial {
        &self.keys
    }

    /// The signer configuration.
    pub fn config(&self) -> &ResponseSignerConfig {
        &self.config
    }
}

/// Returns true if the response is flagged as an error.
///
/// A response is an error when it has a non-null `error` field, or
/// `success: false`, or `status: "error"`.
pub fn is_error_response(data: &Value) -> bool {
    let Some(fields) = data.as_object() else {
        return false;
    };
    fields.get("error").is_some_and(|e| !e.is_null())
        || fields.get("success") == Some(&Value::Bool(false))
        || fields.get("status").and_then(Value::as_str) == Some("error")
}

fn strip_signature_fields(fields: &mut Map<String, Value>) {
    fields.remove(SIGNATURE_FIELD);
    fields.remove(TIMESTAMP_FIELD);
    fields.remove(ALGORITHM_FIELD);
}

fn signing_message(fields: &Map<String, Value>, timestamp: u64) -> Result<Vec<u8>> {
    canonical_bytes(&json!({
        "data": Value::Object(fields.clone()),
        "timestamp": timestamp,
    }))
}

fn compute_mac(key: &[u8], message: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| GuardError::Internal(format!("hmac key rejected: {e}")))?;
    mac.update(message);
    Ok(mac.finalize().into_bytes().to_vec())
}

fn mac_matches(key: &[u8], message: &[u8], expected: &[u8]) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        return false;
    };
    mac.update(message);
    // verify_slice compares in constant time
    mac.verify_slice(expected).is_ok()
}

fn generate_key(length: usize) -> Vec<u8> {
    let mut key = vec![0u8; length];
    OsRng.fill_bytes(&mut key);
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ClockSource, ManualClock};
    use std::sync::Arc;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    fn signer() -> (ResponseSigner, Arc<ManualClock>) {
        let clock = ManualClock::new(1_700_000_000_000);
        let signer = ResponseSigner::new(ResponseSignerConfig::default(), clock.clone()).unwrap();
        (signer, clock)
    }

    #[test]
    fn test_sign_attaches_fields() {
        let (mut signer, clock) = signer();
        let signed = signer.sign_response(json!({"valid": true, "id": 7})).unwrap();

        assert_eq!(signed["valid"], true);
        assert_eq!(signed["id"], 7);
        assert_eq!(signed[SIGNATURE_FIELD].as_str().unwrap().len(), 64);
        assert_eq!(signed[TIMESTAMP_FIELD], clock.now_ms());
        assert_eq!(signed[ALGORITHM_FIELD], HMAC_SHA256);
    }

    #[test]
    fn test_sign_verify_round_trip() {
        let (mut signer, _) = signer();
        let signed = signer.sign_response(json!({"result": {"b": 1, "a": [1, 2]}})).unwrap();

        assert!(signer.verify_response(&signed).valid);
        assert_eq!(signer.stats().verified, 1);
    }

    #[test]
    fn test_tampered_response_rejected() {
        let (mut signer, _) = signer();
        let mut signed = signer.sign_response(json!({"amount": 10})).unwrap();
        signed["amount"] = json!(1000);

        let result = signer.verify_response(&signed);
        assert_eq!(result.reason, Some(ReasonCode::InvalidSignature));
    }

    #[test]
    fn test_tampered_timestamp_rejected() {
        let (mut signer, _) = signer();
        let mut signed = signer.sign_response(json!({"amount": 10})).unwrap();
        signed[TIMESTAMP_FIELD] = json!(1);

        assert!(!signer.verify_response(&signed).valid);
    }

    #[test]
    fn test_missing_signature() {
        let (mut signer, _) = signer();

        let result = signer.verify_response(&json!({"amount": 10}));
        assert_eq!(result.reason, Some(ReasonCode::MissingSignature));

        let result = signer.verify_response(&json!({"amount": 10, "signature": "00"}));
        assert_eq!(result.reason, Some(ReasonCode::MissingSignature));

        let result = signer.verify_response(&json!("plain"));
        assert_eq!(result.reason, Some(ReasonCode::MissingSignature));
    }

    #[test]
    fn test_wrong_algorithm_rejected() {
        let (mut signer, _) = signer();
        let mut signed = signer.sign_response(json!({"ok": 1})).unwrap();
        signed[ALGORITHM_FIELD] = json!("HMAC-MD5");

        assert_eq!(
            signer.verify_response(&signed).reason,
            Some(ReasonCode::InvalidSignature)
        );
    }

    #[test]
    fn test_error_responses_not_signed() {
        let (mut signer, _) = signer();

        for data in [
            json!({"error": "boom"}),
            json!({"success": false, "detail": "x"}),
            json!({"status": "error"}),
        ] {
            let out = signer.sign_response(data.clone()).unwrap();
            assert_eq!(out, data);
        }
        assert_eq!(signer.stats().skipped, 3);

        let out = signer.sign_response(json!({"error": null, "ok": true})).unwrap();
        assert!(out.get(SIGNATURE_FIELD).is_some());
    }

    #[test]
    fn test_non_object_passes_through() {
        let (mut signer, _) = signer();
        assert_eq!(signer.sign_response(json!([1, 2])).unwrap(), json!([1, 2]));
    }

    #[test]
    fn test_resigning_replaces_old_signature() {
        let (mut signer, clock) = signer();
        let first = signer.sign_response(json!({"v": 1})).unwrap();
        clock.advance(Duration::from_secs(1));
        let second = signer.sign_response(first.clone()).unwrap();

        assert_ne!(first[SIGNATURE_FIELD], second[SIGNATURE_FIELD]);
        assert!(signer.verify_response(&second).valid);
    }

    #[test]
    fn test_rotation_window() {
        let (mut signer, clock) = signer();
        let signed = signer.sign_response(json!({"proof": "ok"})).unwrap();

        clock.advance(DAY);
        signer.rotate();
        assert!(signer.verify_response(&signed).valid, "previous key still honoured");
        assert_eq!(signer.stats().previous_key_hits, 1);

        clock.advance(DAY);
        signer.rotate();
        assert!(!signer.verify_response(&signed).valid, "two rotations later");
    }

    #[test]
    fn test_previous_key_expires_without_rotation() {
        let (mut signer, clock) = signer();
        let signed = signer.sign_response(json!({"proof": "ok"})).unwrap();

        signer.rotate();
        clock.advance(DAY);
        assert!(!signer.verify_response(&signed).valid);
    }

    #[test]
    fn test_rotate_keeps_previous_key() {
        let (mut signer, clock) = signer();
        assert!(!signer.key_material().has_previous());

        clock.advance(DAY);
        signer.rotate();
        assert!(signer.key_material().has_previous());
        assert_eq!(signer.key_material().generated_at_ms, clock.now_ms());
        assert_eq!(signer.stats().rotations, 1);
    }

    #[test]
    fn test_shared_secret_signers_agree() {
        let clock = ManualClock::new(5_000);
        let config = ResponseSignerConfig {
            initial_key: Some(vec![7u8; 32]),
            ..ResponseSignerConfig::default()
        };
        let mut a = ResponseSigner::new(config.clone(), clock.clone()).unwrap();
        let mut b = ResponseSigner::new(config, clock).unwrap();

        let signed = a.sign_response(json!({"x": 1})).unwrap();
        assert!(b.verify_response(&signed).valid);
    }

    #[test]
    fn test_config_validation() {
        let clock = ManualClock::new(0);
        let zero = ResponseSignerConfig {
            rotation_interval: Duration::ZERO,
            ..ResponseSignerConfig::default()
        };
        assert!(ResponseSigner::new(zero, clock.clone()).is_err());

        let short = ResponseSignerConfig {
            initial_key: Some(vec![1u8; 4]),
            ..ResponseSignerConfig::default()
        };
        assert!(ResponseSigner::new(short, clock).is_err());
    }

    #[test]
    fn test_debug_redacts_keys() {
        let (signer, _) = signer();
        let rendered = format!("{:?}", signer);
        assert!(rendered.contains("<redacted>"));
    }
}

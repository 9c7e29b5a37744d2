//! Signature Verifier Module
//!
//! Verifies detached Ed25519 signatures over canonical payloads against
//! public keys registered by id.

use std::collections::HashMap;

use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey, PUBLIC_KEY_LENGTH};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{GuardError, ReasonCode, Result, VerificationResult};
use crate::signature::canonical::payload_bytes;

// == Encoding ==
/// Text encoding of signatures and public keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureEncoding {
    /// Standard base64 with padding
    #[default]
    Base64,
    /// Lowercase hexadecimal
    Hex,
}

impl SignatureEncoding {
    /// Decodes `text` into raw bytes.
    pub fn decode(&self, text: &str) -> std::result::Result<Vec<u8>, String> {
        match self {
            SignatureEncoding::Base64 => base64::engine::general_purpose::STANDARD
                .decode(text.trim())
                .map_err(|e| format!("invalid base64: {e}")),
            SignatureEncoding::Hex => {
                hex::decode(text.trim()).map_err(|e| format!("invalid hex: {e}"))
            }
        }
    }

    /// Encodes raw bytes as text.
    pub fn encode(&self, bytes: &[u8]) -> String {
        match self {
            SignatureEncoding::Base64 => base64::engine::general_purpose::STANDARD.encode(bytes),
            SignatureEncoding::Hex => hex::encode(bytes),
        }
    }
}

/// Digital signature scheme used for inbound requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[non_exhaustive]
pub enum SignatureAlgorithm {
    /// Ed25519 (RFC 8032), SHA-512 internally
    #[default]
    Ed25519,
}

/// Signature verifier configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureVerifierConfig {
    /// Encoding of signatures and registered public keys
    pub encoding: SignatureEncoding,
    /// Signature scheme
    pub algorithm: SignatureAlgorithm,
    /// Key id used when a request names none
    pub default_key_id: String,
}

impl Default for SignatureVerifierConfig {
    fn default() -> Self {
        Self {
            encoding: SignatureEncoding::Base64,
            algorithm: SignatureAlgorithm::Ed25519,
            default_key_id: "default".to_string(),
        }
    }
}

impl SignatureVerifierConfig {
    /// Checks the configuration for values the verifier cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.default_key_id.trim().is_empty() {
            return Err(GuardError::InvalidConfig(
                "default_key_id must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// A verifying key and the registration that installed it.
#[derive(Debug, Clone, Copy)]
struct RegisteredKey {
    key: VerifyingKey,
    epoch: u64,
}

// == Signature Verifier ==
/// Registry of public keys and detached-signature checks against them.
#[derive(Debug)]
pub struct SignatureVerifier {
    keys: HashMap<String, RegisteredKey>,
    /// Registrations so far; each one gets the next value as its epoch
    registrations: u64,
    config: SignatureVerifierConfig,
}

impl SignatureVerifier {
    /// Creates a verifier with no registered keys.
    pub fn new(config: SignatureVerifierConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            keys: HashMap::new(),
            registrations: 0,
            config,
        })
    }

    // == Register Key ==
    /// Registers `public_key` under `key_id`, replacing any existing key.
    ///
    /// The key is decoded with the configured encoding. A key that does not
    /// decode to a valid Ed25519 point is a configuration error. Every
    /// successful registration moves the id to a new, higher epoch (see
    /// [`Self::key_epoch`]).
    pub fn register_key(&mut self, key_id: &str, public_key: &str) -> Result<()> {
        let bytes = self
            .config
            .encoding
            .decode(public_key)
            .map_err(GuardError::InvalidKey)?;
        let bytes: [u8; PUBLIC_KEY_LENGTH] = bytes.as_slice().try_into().map_err(|_| {
            GuardError::InvalidKey(format!(
                "expected {} key bytes, got {}",
                PUBLIC_KEY_LENGTH,
                bytes.len()
            ))
        })?;
        let key = VerifyingKey::from_bytes(&bytes)
            .map_err(|e| GuardError::InvalidKey(format!("not an ed25519 point: {e}")))?;

        self.registrations += 1;
        let registered = RegisteredKey {
            key,
            epoch: self.registrations,
        };
        if self.keys.insert(key_id.to_string(), registered).is_some() {
            info!("Replaced verifying key '{}'", key_id);
        } else {
            info!("Registered verifying key '{}'", key_id);
        }
        Ok(())
    }

    /// Returns true if a key is registered under `key_id`.
    pub fn has_key(&self, key_id: &str) -> bool {
        self.keys.contains_key(key_id)
    }

    /// Epoch of the key currently registered under `key_id`.
    ///
    /// Epochs start at 1 and strictly increase with every registration, so
    /// anything derived from a key can be tagged with the epoch it saw.
    pub fn key_epoch(&self, key_id: &str) -> Option<u64> {
        self.keys.get(key_id).map(|registered| registered.epoch)
    }

    /// Number of registered keys.
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Resolves an optional key id to the one actually used.
    pub fn resolve_key_id<'a>(&'a self, key_id: Option<&'a str>) -> &'a str {
        key_id.unwrap_or(&self.config.default_key_id)
    }

    // == Verify ==
    /// Returns true if `signature` is a valid signature over `payload`.
    pub fn verify(&self, payload: &Value, signature: &str, key_id: Option<&str>) -> bool {
        self.verify_with_details(payload, signature, key_id).valid
    }

    /// Verifies `signature` over `payload` and explains any failure.
    ///
    /// Never fails: decode and crypto errors come back as invalid results.
    pub fn verify_with_details(
        &self,
        payload: &Value,
        signature: &str,
        key_id: Option<&str>,
    ) -> VerificationResult {
        let key_id = self.resolve_key_id(key_id);
        let Some(RegisteredKey { key, .. }) = self.keys.get(key_id) else {
            debug!("No verifying key registered for '{}'", key_id);
            return VerificationResult::rejected(
                ReasonCode::NoKeyRegistered,
                format!("no key registered for '{}'", key_id),
            );
        };

        let message = match payload_bytes(payload) {
            Ok(message) => message,
            Err(e) => return VerificationResult::rejected(ReasonCode::InvalidFormat, e.to_string()),
        };

        let signature = match self
            .config
            .encoding
            .decode(signature)
            .and_then(|bytes| Signature::from_slice(&bytes).map_err(|e| e.to_string()))
        {
            Ok(signature) => signature,
            Err(cause) => {
                return VerificationResult::rejected(ReasonCode::InvalidSignature, cause);
            }
        };

        match key.verify_strict(&message, &signature) {
            Ok(()) => VerificationResult::accepted(),
            Err(_) => {
                warn!("Signature verification failed for key '{}'", key_id);
                VerificationResult::rejected(ReasonCode::InvalidSignature, "signature mismatch")
            }
        }
    }
}

// == Signing Helpers ==
/// Produces a detached signature over `payload` in the given encoding.
///
/// This is the client-side counterpart of [`SignatureVerifier::verify`].
pub fn sign_payload(
    signing_key: &SigningKey,
    payload: &Value,
    encoding: SignatureEncoding,
) -> Result<String> {
    let message = payload_bytes(payload)?;
    let signature = signing_key.sign(&message);
    Ok(encoding.encode(&signature.to_bytes()))
}

/// Encodes a verifying key for [`SignatureVerifier::register_key`].
pub fn encode_public_key(key: &VerifyingKey, encoding: SignatureEncoding) -> String {
    encoding.encode(key.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;
    use serde_json::json;

    fn verifier_with_key(key_id: &str) -> (SignatureVerifier, SigningKey) {
        let signing_key = SigningKey::generate(&mut OsRng);
        let mut verifier = SignatureVerifier::new(SignatureVerifierConfig::default()).unwrap();
        let public = encode_public_key(&signing_key.verifying_key(), SignatureEncoding::Base64);
        verifier.register_key(key_id, &public).unwrap();
        (verifier, signing_key)
    }

    #[test]
    fn test_round_trip() {
        let (verifier, key) = verifier_with_key("client-1");
        let payload = json!({"proof": "0xabc", "inputs": [1, 2, 3]});
        let signature = sign_payload(&key, &payload, SignatureEncoding::Base64).unwrap();

        assert!(verifier.verify(&payload, &signature, Some("client-1")));
    }

    #[test]
    fn test_default_key_id() {
        let (verifier, key) = verifier_with_key("default");
        let payload = json!("raw string payload");
        let signature = sign_payload(&key, &payload, SignatureEncoding::Base64).unwrap();

        assert!(verifier.verify(&payload, &signature, None));
    }

    #[test]
    fn test_field_order_is_irrelevant() {
        let (verifier, key) = verifier_with_key("default");
        let signed: Value = serde_json::from_str(r#"{"a":1,"b":2}"#).unwrap();
        let presented: Value = serde_json::from_str(r#"{"b":2,"a":1}"#).unwrap();
        let signature = sign_payload(&key, &signed, SignatureEncoding::Base64).unwrap();

        assert!(verifier.verify(&presented, &signature, None));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let (verifier, key) = verifier_with_key("default");
        let signature = sign_payload(&key, &json!({"amount": 10}), SignatureEncoding::Base64).unwrap();

        let result = verifier.verify_with_details(&json!({"amount": 11}), &signature, None);
        assert_eq!(result.reason, Some(ReasonCode::InvalidSignature));
    }

    #[test]
    fn test_single_byte_mutation_rejected() {
        let (verifier, key) = verifier_with_key("default");
        let payload = json!({"nonce": "abc123"});
        let signature = sign_payload(&key, &payload, SignatureEncoding::Base64).unwrap();
        let raw = SignatureEncoding::Base64.decode(&signature).unwrap();

        for index in 0..raw.len() {
            let mut mutated = raw.clone();
            mutated[index] ^= 0x01;
            let mutated = SignatureEncoding::Base64.encode(&mutated);
            assert!(!verifier.verify(&payload, &mutated, None), "byte {}", index);
        }
    }

    #[test]
    fn test_missing_key() {
        let verifier = SignatureVerifier::new(SignatureVerifierConfig::default()).unwrap();
        let result = verifier.verify_with_details(&json!({}), "AAAA", Some("ghost"));

        assert!(!result.valid);
        assert_eq!(result.reason, Some(ReasonCode::NoKeyRegistered));
        assert!(result.message.contains("ghost"));
    }

    #[test]
    fn test_undecodable_signature_is_a_result() {
        let (verifier, _) = verifier_with_key("default");

        let garbage = verifier.verify_with_details(&json!({}), "%%%not-base64%%%", None);
        assert_eq!(garbage.reason, Some(ReasonCode::InvalidSignature));
        assert!(garbage.message.contains("base64"));

        let short = verifier.verify_with_details(&json!({}), "AAAA", None);
        assert_eq!(short.reason, Some(ReasonCode::InvalidSignature));
    }

    #[test]
    fn test_hex_encoding() {
        let config = SignatureVerifierConfig {
            encoding: SignatureEncoding::Hex,
            ..SignatureVerifierConfig::default()
        };
        let key = SigningKey::generate(&mut OsRng);
        let mut verifier = SignatureVerifier::new(config).unwrap();
        verifier
            .register_key("hex", &encode_public_key(&key.verifying_key(), SignatureEncoding::Hex))
            .unwrap();

        let payload = json!([1, "two", 3.5]);
        let signature = sign_payload(&key, &payload, SignatureEncoding::Hex).unwrap();
        assert!(verifier.verify(&payload, &signature, Some("hex")));
    }

    #[test]
    fn test_register_overwrites() {
        let (mut verifier, old_key) = verifier_with_key("rotating");
        let new_key = SigningKey::generate(&mut OsRng);
        verifier
            .register_key(
                "rotating",
                &encode_public_key(&new_key.verifying_key(), SignatureEncoding::Base64),
            )
            .unwrap();

        let payload = json!({"v": 1});
        let old_sig = sign_payload(&old_key, &payload, SignatureEncoding::Base64).unwrap();
        let new_sig = sign_payload(&new_key, &payload, SignatureEncoding::Base64).unwrap();

        assert!(!verifier.verify(&payload, &old_sig, Some("rotating")));
        assert!(verifier.verify(&payload, &new_sig, Some("rotating")));
        assert_eq!(verifier.key_count(), 1);
    }

    #[test]
    fn test_every_registration_moves_the_epoch() {
        let (mut verifier, key) = verifier_with_key("client-1");
        let public = encode_public_key(&key.verifying_key(), SignatureEncoding::Base64);
        assert_eq!(verifier.key_epoch("client-1"), Some(1));
        assert_eq!(verifier.key_epoch("ghost"), None);

        verifier.register_key("client-2", &public).unwrap();
        verifier.register_key("client-1", &public).unwrap();
        assert_eq!(verifier.key_epoch("client-2"), Some(2));
        assert_eq!(verifier.key_epoch("client-1"), Some(3), "same key, new epoch");

        assert!(verifier.register_key("client-1", "AAAA").is_err());
        assert_eq!(verifier.key_epoch("client-1"), Some(3));
    }

    #[test]
    fn test_register_rejects_bad_key() {
        let mut verifier = SignatureVerifier::new(SignatureVerifierConfig::default()).unwrap();

        assert!(matches!(
            verifier.register_key("k", "not base64!"),
            Err(GuardError::InvalidKey(_))
        ));
        assert!(matches!(
            verifier.register_key("k", "AAAA"),
            Err(GuardError::InvalidKey(_))
        ));
        assert!(!verifier.has_key("k"));
    }

    #[test]
    fn test_empty_default_key_id_rejected() {
        let config = SignatureVerifierConfig {
            default_key_id: " ".to_string(),
            ..SignatureVerifierConfig::default()
        };
        assert!(SignatureVerifier::new(config).is_err());
    }
}

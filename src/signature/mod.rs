//! Signature Module
//!
//! Inbound tamper detection (detached Ed25519 signatures over canonical
//! payloads) and outbound response integrity (HMAC-SHA256 with key rotation).

pub mod canonical;
mod response_signer;
mod shared;
mod verifier;

// Re-export public types
pub use response_signer::{
    ResponseSigner, ResponseSignerConfig, SignerStats, SigningKeyMaterial, ALGORITHM_FIELD,
    HMAC_SHA256, SIGNATURE_FIELD, TIMESTAMP_FIELD,
};
pub use shared::SharedResponseSigner;
pub use verifier::{
    encode_public_key, sign_payload, SignatureAlgorithm, SignatureEncoding, SignatureVerifier,
    SignatureVerifierConfig,
};

//! Proof fingerprints
//!
//! Stable cache keys for verification results: the SHA-256 of the canonical
//! form of a proof together with its public inputs.

use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::signature::canonical::canonical_bytes;

/// Returns the lowercase hex SHA-256 fingerprint of `proof` and
/// `public_inputs`.
///
/// Object key order does not affect the result.
pub fn fingerprint(proof: &Value, public_inputs: &Value) -> Result<String> {
    let material = json!({
        "proof": proof,
        "publicInputs": public_inputs,
    });
    let digest = Sha256::digest(canonical_bytes(&material)?);
    Ok(hex::encode(digest))
}

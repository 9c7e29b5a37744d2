//! Request and Response models for the guard sidecar API
//!
//! This module defines the DTOs (Data Transfer Objects) used for
//! serializing/deserializing HTTP request and response bodies.

pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use requests::{signing_envelope, RegisterKeyRequest, VerifyRequest};
pub use responses::{HealthResponse, RegisterKeyResponse, StatsResponse, VerifyResponse};

//! API Module
//!
//! HTTP handlers and routing for the guard sidecar REST API.
//!
//! # Endpoints
//! - `PUT /keys` - Register a verifying key
//! - `POST /requests/verify` - Authenticate a signed request and burn its nonce
//! - `POST /responses/verify` - Check a signed response
//! - `GET /stats` - Get guard statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;

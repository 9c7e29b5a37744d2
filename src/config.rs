//! Configuration Module
//!
//! Loads the sidecar configuration from environment variables and hands each
//! component its own configuration struct.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::CacheConfig;
use crate::error::{GuardError, Result};
use crate::nonce::NonceConfig;
use crate::signature::{ResponseSignerConfig, SignatureVerifierConfig};

/// Sidecar configuration.
///
/// Every value can be set through an environment variable; anything absent
/// or unparsable keeps the component default. The one exception is
/// `SIGNING_SECRET`: a secret that is set but not valid hex makes
/// [`Config::validate`] fail.
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server port
    pub server_port: u16,
    /// Replay protection settings
    pub nonce: NonceConfig,
    /// Inbound signature settings
    pub verifier: SignatureVerifierConfig,
    /// Outbound response signing settings
    pub signer: ResponseSignerConfig,
    /// Verification result cache settings
    pub cache: CacheConfig,
    /// Why `SIGNING_SECRET` was rejected, if it was set but malformed
    pub signing_secret_error: Option<String>,
}

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 3000;

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn env_secs(name: &str) -> Option<Duration> {
    env_parse::<u64>(name)
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `NONCE_TTL_SECS` - Replay window in seconds (default: 300)
    /// - `NONCE_FUTURE_TOLERANCE_SECS` - Allowed clock skew in seconds (default: 60)
    /// - `NONCE_MIN_LENGTH` - Shortest accepted nonce (default: 4)
    /// - `NONCE_STRICT_ORDERING` - Enforce increasing numeric nonces (default: false)
    /// - `CACHE_MAX_ITEMS` - Maximum cached verdicts (default: 1000)
    /// - `CACHE_MAX_BYTES` - Cache byte budget (default: 50 MiB)
    /// - `CACHE_DEFAULT_TTL_SECS` - Verdict lifetime in seconds, 0 for none (default: 3600)
    /// - `CLEANUP_INTERVAL_SECS` - Nonce sweep and cache prune period (default: 60)
    /// - `KEY_ROTATION_INTERVAL_SECS` - Response key rotation period (default: 86400)
    /// - `SIGNING_SECRET` - Hex HMAC key to start with (default: random)
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(port) = env_parse("SERVER_PORT") {
            config.server_port = port;
        }

        if let Some(ttl) = env_secs("NONCE_TTL_SECS") {
            config.nonce.ttl = ttl;
        }
        if let Some(tolerance) = env_parse::<u64>("NONCE_FUTURE_TOLERANCE_SECS") {
            config.nonce.future_tolerance = Duration::from_secs(tolerance);
        }
        if let Some(min_length) = env_parse("NONCE_MIN_LENGTH") {
            config.nonce.min_length = min_length;
        }
        if let Some(strict) = env_parse("NONCE_STRICT_ORDERING") {
            config.nonce.strict_ordering = strict;
        }

        if let Some(max_items) = env_parse("CACHE_MAX_ITEMS") {
            config.cache.max_items = max_items;
        }
        if let Some(max_bytes) = env_parse("CACHE_MAX_BYTES") {
            config.cache.max_size_bytes = max_bytes;
        }
        if let Some(ttl_secs) = env_parse::<u64>("CACHE_DEFAULT_TTL_SECS") {
            config.cache.default_ttl = (ttl_secs > 0).then(|| Duration::from_secs(ttl_secs));
        }

        if let Some(interval) = env_secs("CLEANUP_INTERVAL_SECS") {
            config.nonce.sweep_interval = interval;
            config.cache.prune_interval = interval;
        }

        if let Some(interval) = env_secs("KEY_ROTATION_INTERVAL_SECS") {
            config.signer.rotation_interval = interval;
        }
        if let Ok(secret) = env::var("SIGNING_SECRET") {
            match hex::decode(secret.trim()) {
                Ok(key) => config.signer.initial_key = Some(key),
                Err(e) => {
                    config.signing_secret_error = Some(format!("SIGNING_SECRET is not hex: {e}"))
                }
            }
        }

        config
    }

    /// Validates every component configuration.
    pub fn validate(&self) -> Result<()> {
        if let Some(error) = &self.signing_secret_error {
            return Err(GuardError::InvalidConfig(error.clone()));
        }
        self.nonce.validate()?;
        self.verifier.validate()?;
        self.signer.validate()?;
        self.cache.validate()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_port: DEFAULT_PORT,
            nonce: NonceConfig::default(),
            verifier: SignatureVerifierConfig::default(),
            signer: ResponseSignerConfig::default(),
            cache: CacheConfig::default(),
            signing_secret_error: None,
        }
    }
}

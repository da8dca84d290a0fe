//! Configuration for API key generation and hashing.

use argon2::Params;
use serde::Deserialize;

use crate::error::{ApiKeyError, Result};

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HasherConfig {
    /// Memory cost in KiB.
    pub memory_kib: u32,
    /// Number of passes.
    pub iterations: u32,
    /// Degree of parallelism (lanes).
    pub parallelism: u32,
}

impl Default for HasherConfig {
    fn default() -> Self {
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

impl HasherConfig {
    /// Create a hasher config with explicit cost parameters.
    pub fn new(memory_kib: u32, iterations: u32, parallelism: u32) -> Self {
        Self {
            memory_kib,
            iterations,
            parallelism,
        }
    }

    /// Build the argon2 parameter set, rejecting values the library refuses.
    pub fn params(&self) -> Result<Params> {
        Params::new(self.memory_kib, self.iterations, self.parallelism, None)
            .map_err(|e| ApiKeyError::InvalidConfig(format!("argon2 parameters: {e}")))
    }
}

/// Configuration for API key generation and storage.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ApiKeyConfig {
    /// Random bytes behind the lookup prefix (5 bytes encode to 8 characters).
    pub prefix_bytes: usize,
    /// Random bytes behind the secret.
    pub secret_bytes: usize,
    /// How many fresh keys `create` tries before giving up on prefix collisions.
    pub max_create_attempts: u32,
    /// Cost parameters for the secret digest.
    pub hasher: HasherConfig,
}

impl Default for ApiKeyConfig {
    fn default() -> Self {
        Self {
            prefix_bytes: 5,
            secret_bytes: 32,
            max_create_attempts: 5,
            hasher: HasherConfig::default(),
        }
    }
}

impl ApiKeyConfig {
    pub const MIN_PREFIX_BYTES: usize = 5;
    pub const MIN_SECRET_BYTES: usize = 16;

    /// Set the number of random prefix bytes.
    pub fn with_prefix_bytes(mut self, prefix_bytes: usize) -> Self {
        self.prefix_bytes = prefix_bytes;
        self
    }

    /// Set the number of random secret bytes.
    pub fn with_secret_bytes(mut self, secret_bytes: usize) -> Self {
        self.secret_bytes = secret_bytes;
        self
    }

    /// Set the collision retry budget for `create`.
    pub fn with_max_create_attempts(mut self, attempts: u32) -> Self {
        self.max_create_attempts = attempts;
        self
    }

    /// Set the hashing cost parameters.
    pub fn with_hasher(mut self, hasher: HasherConfig) -> Self {
        self.hasher = hasher;
        self
    }

    /// Check that every value is usable.
    pub fn validate(&self) -> Result<()> {
        if self.prefix_bytes < Self::MIN_PREFIX_BYTES {
            return Err(ApiKeyError::InvalidConfig(format!(
                "prefix_bytes must be at least {}, got {}",
                Self::MIN_PREFIX_BYTES,
                self.prefix_bytes
            )));
        }
        if self.secret_bytes < Self::MIN_SECRET_BYTES {
            return Err(ApiKeyError::InvalidConfig(format!(
                "secret_bytes must be at least {}, got {}",
                Self::MIN_SECRET_BYTES,
                self.secret_bytes
            )));
        }
        if self.max_create_attempts == 0 {
            return Err(ApiKeyError::InvalidConfig(
                "max_create_attempts must be at least 1".to_string(),
            ));
        }
        self.hasher.params()?;
        Ok(())
    }
}

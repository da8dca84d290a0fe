//! Source of the random bytes behind prefixes, secrets and salts.

use std::fmt;
use std::sync::Arc;

use rand::RngCore;
use rand::rngs::OsRng;

use crate::error::{ApiKeyError, Result};

/// Cryptographically secure byte source.
///
/// A failure is final: callers surface `EntropySourceUnavailable` and never
/// retry with a weaker generator.
pub trait EntropySource: Send + Sync {
    fn try_fill(&self, dest: &mut [u8]) -> std::result::Result<(), rand::Error>;
}

/// The operating system's random source.
impl EntropySource for OsRng {
    fn try_fill(&self, dest: &mut [u8]) -> std::result::Result<(), rand::Error> {
        let mut rng = *self;
        rng.try_fill_bytes(dest)
    }
}

/// Shared handle to an [`EntropySource`], `OsRng` unless overridden.
#[derive(Clone)]
pub struct Entropy(Arc<dyn EntropySource>);

impl Entropy {
    pub fn new<S: EntropySource + 'static>(source: S) -> Self {
        Self(Arc::new(source))
    }

    /// Fill `dest` or fail with `EntropySourceUnavailable`.
    pub(crate) fn fill(&self, dest: &mut [u8]) -> Result<()> {
        self.0.try_fill(dest).map_err(|e| {
            log::error!("Random source failed: {}", e);
            ApiKeyError::EntropySourceUnavailable
        })
    }
}

impl Default for Entropy {
    fn default() -> Self {
        Self::new(OsRng)
    }
}

impl fmt::Debug for Entropy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Entropy")
    }
}

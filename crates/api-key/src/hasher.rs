//! Argon2id hashing for API key secrets.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Version};

use crate::config::HasherConfig;
use crate::entropy::Entropy;
use crate::error::{ApiKeyError, Result};

/// Salt length in bytes.
const SALT_LEN: usize = 16;

/// Input hashed into the placeholder digest used to equalize failure paths.
const DUMMY_SECRET: &[u8] = b"api-key-placeholder-secret";

/// Fixed salt for the placeholder digest; it never guards a real secret.
const DUMMY_SALT: [u8; SALT_LEN] = [0x5a; SALT_LEN];

/// Salted, memory-hard digest of key secrets.
///
/// Digests are PHC strings (`$argon2id$v=19$m=...,t=...,p=...$salt$hash`),
/// so cost parameters travel with each stored hash and old digests keep
/// verifying after the configured cost changes.
#[derive(Clone)]
pub struct KeyHasher {
    argon2: Argon2<'static>,
    dummy_digest: String,
    entropy: Entropy,
}

impl KeyHasher {
    /// Build a hasher with the given cost parameters.
    pub fn new(config: &HasherConfig) -> Result<Self> {
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, config.params()?);
        let dummy_digest = hash_with_salt(&argon2, DUMMY_SECRET, &DUMMY_SALT)?;
        Ok(Self {
            argon2,
            dummy_digest,
            entropy: Entropy::default(),
        })
    }

    /// Draw salts from `entropy` instead of the OS random source.
    pub fn with_entropy(mut self, entropy: Entropy) -> Self {
        self.entropy = entropy;
        self
    }

    /// Hash a secret with a fresh random salt.
    pub fn hash(&self, secret: &[u8]) -> Result<String> {
        let mut salt = [0u8; SALT_LEN];
        self.entropy.fill(&mut salt)?;
        hash_with_salt(&self.argon2, secret, &salt)
    }

    /// Check a secret against a stored digest.
    ///
    /// Any failure, including an unparseable digest, is `false`. The digest
    /// comparison inside argon2 is constant-time.
    pub fn verify(&self, secret: &[u8], digest: &str) -> bool {
        match PasswordHash::new(digest) {
            Ok(parsed) => self.argon2.verify_password(secret, &parsed).is_ok(),
            Err(e) => {
                log::warn!("stored API key digest is unparseable: {}", e);
                self.verify_dummy();
                false
            }
        }
    }

    /// Spend the same work as one verification without a real digest.
    pub fn verify_dummy(&self) {
        if let Ok(parsed) = PasswordHash::new(&self.dummy_digest) {
            let _ = self.argon2.verify_password(DUMMY_SECRET, &parsed);
        }
    }
}

fn hash_with_salt(argon2: &Argon2<'static>, secret: &[u8], salt: &[u8]) -> Result<String> {
    let salt = SaltString::encode_b64(salt)
        .map_err(|e| ApiKeyError::Hashing(e.to_string()))?;

    argon2
        .hash_password(secret, &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiKeyError::Hashing(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entropy::testing::FailingSource;

    fn hasher() -> KeyHasher {
        KeyHasher::new(&HasherConfig::new(256, 1, 1)).unwrap()
    }

    #[test]
    fn test_hash_is_argon2id_phc() {
        let digest = hasher().hash(b"secret").unwrap();
        assert!(digest.starts_with("$argon2id$v=19$m=256,t=1,p=1$"));
    }

    #[test]
    fn test_verify_matching_secret() {
        let hasher = hasher();
        let digest = hasher.hash(b"correct horse").unwrap();
        assert!(hasher.verify(b"correct horse", &digest));
    }

    #[test]
    fn test_verify_wrong_secret() {
        let hasher = hasher();
        let digest = hasher.hash(b"correct horse").unwrap();
        assert!(!hasher.verify(b"battery staple", &digest));
        assert!(!hasher.verify(b"correct hors", &digest));
        assert!(!hasher.verify(b"", &digest));
    }

    #[test]
    fn test_hash_is_salted() {
        let hasher = hasher();
        let d1 = hasher.hash(b"same secret").unwrap();
        let d2 = hasher.hash(b"same secret").unwrap();
        assert_ne!(d1, d2);
        assert!(hasher.verify(b"same secret", &d1));
        assert!(hasher.verify(b"same secret", &d2));
    }

    #[test]
    fn test_verify_malformed_digest_is_false() {
        let hasher = hasher();
        for digest in ["", "not a hash", "$argon2id$", "$argon2id$v=19$m=256,t=1,p=1$AAAA"] {
            assert!(!hasher.verify(b"secret", digest));
        }
    }

    #[test]
    fn test_verify_tampered_digest_is_false() {
        let hasher = hasher();
        let mut digest = hasher.hash(b"secret").unwrap();
        let last = digest.pop().unwrap();
        digest.push(if last == 'A' { 'B' } else { 'A' });
        assert!(!hasher.verify(b"secret", &digest));
    }

    #[test]
    fn test_verify_digest_from_other_cost_parameters() {
        let old = KeyHasher::new(&HasherConfig::new(512, 2, 1)).unwrap();
        let digest = old.hash(b"secret").unwrap();
        assert!(hasher().verify(b"secret", &digest));
    }

    #[test]
    fn test_hash_fails_without_entropy() {
        let hasher = hasher().with_entropy(Entropy::new(FailingSource::after(0)));
        assert!(matches!(
            hasher.hash(b"secret"),
            Err(ApiKeyError::EntropySourceUnavailable)
        ));
        // Failure paths still cost one verification.
        assert!(!hasher.verify(b"secret", "not a hash"));
    }

    #[test]
    fn test_default_parameters_accepted() {
        assert!(KeyHasher::new(&HasherConfig::default()).is_ok());
    }
}

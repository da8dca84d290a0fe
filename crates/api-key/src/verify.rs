//! Request-time key verification.

use thiserror::Error;

use crate::codec::KeyCodec;
use crate::error::{ApiKeyError, Result};
use crate::hasher::KeyHasher;
use crate::record::OwnerId;
use crate::repository::KeyRepository;

/// Why a presented key was refused. Internal only: callers outside the
/// trust boundary get [`ApiKeyError::Unauthorized`] for all of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("malformed key")]
    Malformed,
    #[error("unknown prefix")]
    NotFound,
    #[error("key revoked")]
    Revoked,
    #[error("secret mismatch")]
    SecretMismatch,
    #[error("storage failure")]
    Storage,
}

impl Rejection {
    /// Stable label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Rejection::Malformed => "malformed",
            Rejection::NotFound => "not_found",
            Rejection::Revoked => "revoked",
            Rejection::SecretMismatch => "secret_mismatch",
            Rejection::Storage => "storage",
        }
    }
}

/// Resolves a presented key to its owner.
///
/// Every refusal path runs exactly one slow hash, so response time does not
/// reveal whether a prefix exists.
pub struct VerificationService<R> {
    repo: R,
    hasher: KeyHasher,
}

impl<R: KeyRepository> VerificationService<R> {
    pub fn new(repo: R, hasher: KeyHasher) -> Self {
        Self { repo, hasher }
    }

    /// Authenticate a presented key, collapsing every failure into
    /// `Unauthorized`.
    pub fn verify(&self, presented: &str) -> Result<OwnerId> {
        self.check(presented).map_err(|_| ApiKeyError::Unauthorized)
    }

    /// Authenticate a presented key, keeping the internal failure reason.
    pub fn check(&self, presented: &str) -> std::result::Result<OwnerId, Rejection> {
        let decoded = match KeyCodec::decode(presented) {
            Ok(decoded) => decoded,
            Err(_) => {
                self.hasher.verify_dummy();
                log::info!("API key rejected: {}", Rejection::Malformed.label());
                return Err(Rejection::Malformed);
            }
        };
        let prefix = decoded.prefix();

        let record = match self.repo.find_by_prefix(prefix) {
            Ok(Some(record)) => record,
            Ok(None) => {
                self.hasher.verify_dummy();
                log::info!(
                    "API key {} rejected: {}",
                    prefix,
                    Rejection::NotFound.label()
                );
                return Err(Rejection::NotFound);
            }
            Err(e) => {
                log::error!("API key {} lookup failed: {}", prefix, e);
                return Err(Rejection::Storage);
            }
        };

        // Hash before looking at the revoked flag so both refusals cost the same.
        let secret_ok = self
            .hasher
            .verify(decoded.secret().as_bytes(), record.secret_hash());

        let rejection = if record.revoked() {
            Rejection::Revoked
        } else if !secret_ok {
            Rejection::SecretMismatch
        } else {
            return Ok(record.owner().clone());
        };

        log::info!("API key {} rejected: {}", prefix, rejection.label());
        Err(rejection)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use super::*;
    use crate::config::{ApiKeyConfig, HasherConfig};
    use crate::record::KeyRecord;
    use crate::repository::MemoryRepository;
    use crate::store::KeyStore;

    fn store() -> KeyStore<Arc<MemoryRepository>> {
        let config = ApiKeyConfig::default().with_hasher(HasherConfig::new(256, 1, 1));
        KeyStore::new(Arc::new(MemoryRepository::new()), &config).unwrap()
    }

    /// Fails every lookup.
    struct BrokenRepository;

    impl KeyRepository for BrokenRepository {
        fn insert(&self, _: KeyRecord) -> Result<()> {
            Err(ApiKeyError::Storage("down".to_string()))
        }
        fn find_by_prefix(&self, _: &str) -> Result<Option<KeyRecord>> {
            Err(ApiKeyError::Storage("down".to_string()))
        }
        fn set_revoked(&self, _: &str, _: bool) -> Result<bool> {
            Err(ApiKeyError::Storage("down".to_string()))
        }
        fn list_by_owner(&self, _: &OwnerId) -> Result<Vec<KeyRecord>> {
            Err(ApiKeyError::Storage("down".to_string()))
        }
        fn list_all(&self) -> Result<Vec<KeyRecord>> {
            Err(ApiKeyError::Storage("down".to_string()))
        }
        fn delete(&self, _: &str) -> Result<bool> {
            Err(ApiKeyError::Storage("down".to_string()))
        }
    }

    #[test]
    fn test_verify_created_key() {
        let store = store();
        let verifier = store.verification_service();
        let owner = OwnerId::new("acct-1");
        let created = store.create(&owner).unwrap();

        assert_eq!(verifier.verify(created.plaintext.expose()).unwrap(), owner);
    }

    #[test]
    fn test_revoked_key_is_unauthorized() {
        let store = store();
        let verifier = store.verification_service();
        let created = store.create(&OwnerId::new("acct-1")).unwrap();

        store.revoke(&created.metadata.prefix).unwrap();
        assert_eq!(
            verifier.check(created.plaintext.expose()),
            Err(Rejection::Revoked)
        );
        assert!(matches!(
            verifier.verify(created.plaintext.expose()),
            Err(ApiKeyError::Unauthorized)
        ));
    }

    #[test]
    fn test_wrong_secret() {
        let store = store();
        let verifier = store.verification_service();
        let created = store.create(&OwnerId::new("acct-1")).unwrap();

        let forged = format!("{}.wrong-secret", created.metadata.prefix);
        assert_eq!(verifier.check(&forged), Err(Rejection::SecretMismatch));
        assert!(matches!(
            verifier.verify(&forged),
            Err(ApiKeyError::Unauthorized)
        ));
    }

    #[test]
    fn test_unknown_prefix() {
        let verifier = store().verification_service();
        assert_eq!(
            verifier.check("zzzzzzzz.whatever"),
            Err(Rejection::NotFound)
        );
    }

    #[test]
    fn test_malformed_inputs_never_panic() {
        let verifier = store().verification_service();
        for presented in ["", "not-a-valid-format", ".secret", "prefix.", "a.b.c"] {
            assert_eq!(verifier.check(presented), Err(Rejection::Malformed));
            assert!(matches!(
                verifier.verify(presented),
                Err(ApiKeyError::Unauthorized)
            ));
        }
    }

    #[test]
    fn test_storage_failure_is_unauthorized() {
        let hasher = KeyHasher::new(&HasherConfig::new(256, 1, 1)).unwrap();
        let verifier = VerificationService::new(BrokenRepository, hasher);
        assert_eq!(
            verifier.check("abcdefgh.secret"),
            Err(Rejection::Storage)
        );
        assert!(matches!(
            verifier.verify("abcdefgh.secret"),
            Err(ApiKeyError::Unauthorized)
        ));
    }

    #[test]
    fn test_failure_messages_are_identical() {
        let store = store();
        let verifier = store.verification_service();
        let created = store.create(&OwnerId::new("acct-1")).unwrap();
        store.revoke(&created.metadata.prefix).unwrap();

        let forged = format!("{}.wrong", created.metadata.prefix);
        let messages: Vec<String> = [
            "garbage",
            "zzzzzzzz.unknown",
            forged.as_str(),
            created.plaintext.expose(),
        ]
        .iter()
        .map(|k| verifier.verify(k).unwrap_err().to_string())
        .collect();
        assert!(messages.iter().all(|m| m == "Unauthorized"));
    }

    #[test]
    fn test_end_to_end_lifecycle() {
        let repo = Arc::new(MemoryRepository::new());
        let hasher = KeyHasher::new(&HasherConfig::new(256, 1, 1)).unwrap();
        let owner = OwnerId::new("U");

        // Seed a key minted outside the codec
        let digest = hasher.hash(b"s3cr3t-materialXYZ").unwrap();
        repo.insert(KeyRecord::new("ab12cd34", digest, owner.clone(), Utc::now()))
            .unwrap();

        let verifier = VerificationService::new(repo.clone(), hasher);
        assert_eq!(verifier.verify("ab12cd34.s3cr3t-materialXYZ").unwrap(), owner);

        repo.set_revoked("ab12cd34", true).unwrap();
        assert!(verifier.verify("ab12cd34.s3cr3t-materialXYZ").is_err());
        assert!(verifier.verify("ab12cd34.wrong-secret").is_err());
        assert!(verifier.verify("not-a-valid-format").is_err());
    }
}

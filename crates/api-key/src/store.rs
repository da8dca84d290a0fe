//! Key lifecycle: issue, look up, revoke, list.

use chrono::{DateTime, Utc};

use crate::codec::{KeyCodec, PlaintextKey};
use crate::config::ApiKeyConfig;
use crate::entropy::Entropy;
use crate::error::{ApiKeyError, Result};
use crate::hasher::KeyHasher;
use crate::record::{KeyMetadata, KeyRecord, OwnerId};
use crate::repository::KeyRepository;
use crate::verify::VerificationService;

/// Result of [`KeyStore::create`].
///
/// `plaintext` is the only copy of the full key that will ever exist outside
/// the caller. Show or transmit it immediately; it cannot be recovered.
#[derive(Debug)]
pub struct CreatedKey {
    pub metadata: KeyMetadata,
    pub plaintext: PlaintextKey,
}

/// Narrows a key listing. Unset fields match every record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyFilter {
    pub owner: Option<OwnerId>,
    pub revoked: Option<bool>,
    pub created_since: Option<DateTime<Utc>>,
}

impl KeyFilter {
    pub fn owner(mut self, owner: OwnerId) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn revoked(mut self, revoked: bool) -> Self {
        self.revoked = Some(revoked);
        self
    }

    pub fn created_since(mut self, since: DateTime<Utc>) -> Self {
        self.created_since = Some(since);
        self
    }

    pub fn matches(&self, metadata: &KeyMetadata) -> bool {
        self.owner.as_ref().is_none_or(|o| *o == metadata.owner)
            && self.revoked.is_none_or(|r| r == metadata.revoked)
            && self.created_since.is_none_or(|t| metadata.created_at >= t)
    }
}

/// Authoritative lifecycle manager over a [`KeyRepository`].
pub struct KeyStore<R> {
    repo: R,
    codec: KeyCodec,
    hasher: KeyHasher,
    max_create_attempts: u32,
}

impl<R: KeyRepository> KeyStore<R> {
    pub fn new(repo: R, config: &ApiKeyConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            repo,
            codec: KeyCodec::new(config),
            hasher: KeyHasher::new(&config.hasher)?,
            max_create_attempts: config.max_create_attempts,
        })
    }

    /// Draw prefixes, secrets and salts from `entropy`.
    pub fn with_entropy(mut self, entropy: Entropy) -> Self {
        self.codec = self.codec.with_entropy(entropy.clone());
        self.hasher = self.hasher.with_entropy(entropy);
        self
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn hasher(&self) -> &KeyHasher {
        &self.hasher
    }

    /// Issue a new active key for `owner`.
    ///
    /// A prefix collision regenerates the whole key; the caller only sees
    /// `DuplicatePrefix` once the retry budget is spent.
    pub fn create(&self, owner: &OwnerId) -> Result<CreatedKey> {
        for attempt in 1..=self.max_create_attempts {
            let generated = self.codec.generate()?;
            let secret_hash = self.hasher.hash(generated.secret().as_bytes())?;
            let record = KeyRecord::new(generated.prefix(), secret_hash, owner.clone(), Utc::now());
            let metadata = KeyMetadata::from(&record);

            match self.repo.insert(record) {
                Ok(()) => {
                    log::info!("Issued API key {} for {}", metadata.prefix, owner);
                    return Ok(CreatedKey {
                        metadata,
                        plaintext: generated.into_plaintext(),
                    });
                }
                Err(ApiKeyError::DuplicatePrefix) => {
                    log::warn!(
                        "Prefix collision on {} (attempt {}/{}), regenerating",
                        metadata.prefix,
                        attempt,
                        self.max_create_attempts
                    );
                }
                Err(e) => return Err(e),
            }
        }

        log::error!(
            "Gave up issuing a key for {} after {} prefix collisions",
            owner,
            self.max_create_attempts
        );
        Err(ApiKeyError::DuplicatePrefix)
    }

    pub fn lookup_by_prefix(&self, prefix: &str) -> Result<KeyRecord> {
        self.repo
            .find_by_prefix(prefix)?
            .ok_or(ApiKeyError::NotFound)
    }

    /// Mark a key revoked. Revoking an already revoked key succeeds.
    pub fn revoke(&self, id: &str) -> Result<()> {
        if !self.repo.set_revoked(id, true)? {
            return Err(ApiKeyError::NotFound);
        }
        log::info!("Revoked API key {}", id);
        Ok(())
    }

    /// Revoke every listed key. Unknown ids are skipped; returns how many
    /// records were found.
    pub fn revoke_many<I, S>(&self, ids: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut found = 0;
        for id in ids {
            let id = id.as_ref();
            if self.repo.set_revoked(id, true)? {
                found += 1;
            } else {
                log::debug!("Skipping unknown API key {} in batch revoke", id);
            }
        }
        log::info!("Batch revoked {} API keys", found);
        Ok(found)
    }

    /// Administrative override that re-activates a revoked key.
    pub fn reactivate(&self, id: &str) -> Result<()> {
        if !self.repo.set_revoked(id, false)? {
            return Err(ApiKeyError::NotFound);
        }
        log::warn!("API key {} re-activated by administrative override", id);
        Ok(())
    }

    /// Destructive removal of a record, losing its revocation history.
    pub fn delete(&self, id: &str) -> Result<()> {
        if !self.repo.delete(id)? {
            return Err(ApiKeyError::NotFound);
        }
        log::warn!("API key {} permanently deleted", id);
        Ok(())
    }

    pub fn list(&self, owner: &OwnerId) -> Result<Vec<KeyMetadata>> {
        Ok(self
            .repo
            .list_by_owner(owner)?
            .iter()
            .map(KeyMetadata::from)
            .collect())
    }

    pub fn list_all(&self) -> Result<Vec<KeyMetadata>> {
        Ok(self.repo.list_all()?.iter().map(KeyMetadata::from).collect())
    }

    /// Records matching `filter`, newest first.
    pub fn list_filtered(&self, filter: &KeyFilter) -> Result<Vec<KeyMetadata>> {
        let listed = match &filter.owner {
            Some(owner) => self.list(owner)?,
            None => self.list_all()?,
        };
        Ok(listed.into_iter().filter(|m| filter.matches(m)).collect())
    }
}

impl<R: KeyRepository + Clone> KeyStore<R> {
    /// A verifier sharing this store's repository and hasher.
    pub fn verification_service(&self) -> VerificationService<R> {
        VerificationService::new(self.repo.clone(), self.hasher.clone())
    }
}

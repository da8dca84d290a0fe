//! Operator-facing key management: the verbs behind the CLI.

use std::fmt;

use api_key::{
    ApiKeyConfig, KeyFilter, KeyMetadata, KeyRepository, KeyStore, OwnerId, PlaintextKey,
    VerificationService,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Shown in place of the key anywhere after creation.
pub const MASKED_KEY: &str = "****************";

/// A freshly issued key, as displayed to the operator exactly once.
#[derive(Debug)]
pub struct Issued {
    pub metadata: KeyMetadata,
    pub plaintext: PlaintextKey,
}

impl Issued {
    /// One-time reveal message.
    pub fn warning(&self) -> String {
        format!(
            "The API key for {} is: {}. Please store it somewhere safe: \
             you will not be able to see it again.",
            self.metadata.owner,
            self.plaintext.expose()
        )
    }
}

/// One row of the key listing.
#[derive(Debug, Clone, Serialize)]
pub struct KeyRow {
    pub owner: OwnerId,
    pub prefix: String,
    pub created: DateTime<Utc>,
    pub revoked: bool,
    pub api_key: &'static str,
}

impl From<KeyMetadata> for KeyRow {
    fn from(metadata: KeyMetadata) -> Self {
        Self {
            owner: metadata.owner,
            prefix: metadata.prefix,
            created: metadata.created_at,
            revoked: metadata.revoked,
            api_key: MASKED_KEY,
        }
    }
}

impl fmt::Display for KeyRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<24} {:<12} {:<20} {:<7} {}",
            self.owner,
            self.prefix,
            self.created.format("%Y-%m-%d %H:%M:%S").to_string(),
            if self.revoked { "yes" } else { "no" },
            self.api_key
        )
    }
}

/// Header line matching [`KeyRow`]'s `Display` layout.
pub fn table_header() -> String {
    format!(
        "{:<24} {:<12} {:<20} {:<7} {}",
        "OWNER", "PREFIX", "CREATED", "REVOKED", "API KEY"
    )
}

pub struct AdminConsole<R> {
    store: KeyStore<R>,
    verifier: VerificationService<R>,
}

impl<R: KeyRepository + Clone> AdminConsole<R> {
    pub fn new(repo: R, config: &ApiKeyConfig) -> api_key::Result<Self> {
        let store = KeyStore::new(repo, config)?;
        let verifier = store.verification_service();
        Ok(Self { store, verifier })
    }

    pub fn create_key(&self, owner: &OwnerId) -> api_key::Result<Issued> {
        let created = self.store.create(owner)?;
        Ok(Issued {
            metadata: created.metadata,
            plaintext: created.plaintext,
        })
    }

    pub fn revoke_key(&self, id: &str) -> api_key::Result<()> {
        self.store.revoke(id)
    }

    /// "Revoke selected API keys".
    pub fn revoke_keys<S: AsRef<str>>(&self, ids: &[S]) -> api_key::Result<usize> {
        self.store.revoke_many(ids)
    }

    pub fn reactivate_key(&self, id: &str) -> api_key::Result<()> {
        self.store.reactivate(id)
    }

    pub fn delete_key(&self, id: &str) -> api_key::Result<()> {
        self.store.delete(id)
    }

    /// Listing filtered by owner, revoked state and creation time.
    pub fn list_keys(&self, filter: &KeyFilter) -> api_key::Result<Vec<KeyRow>> {
        let listed = self.store.list_filtered(filter)?;
        Ok(listed.into_iter().map(KeyRow::from).collect())
    }

    pub fn authenticate(&self, presented: &str) -> api_key::Result<OwnerId> {
        self.verifier.verify(presented)
    }
}

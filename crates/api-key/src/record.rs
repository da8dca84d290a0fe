//! Persisted representation of an issued API key.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reference to the account that owns a key. Opaque to this crate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for OwnerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Stored API key.
///
/// The prefix doubles as the record id. The secret digest is set once at
/// construction and has no setter; only the revoked flag changes afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyRecord {
    prefix: String,
    secret_hash: String,
    owner: OwnerId,
    revoked: bool,
    created_at: DateTime<Utc>,
}

impl KeyRecord {
    /// A freshly issued, active record.
    pub fn new(
        prefix: impl Into<String>,
        secret_hash: impl Into<String>,
        owner: OwnerId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self::from_parts(prefix, secret_hash, owner, false, created_at)
    }

    /// Rebuild a record loaded from storage.
    pub fn from_parts(
        prefix: impl Into<String>,
        secret_hash: impl Into<String>,
        owner: OwnerId,
        revoked: bool,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            secret_hash: secret_hash.into(),
            owner,
            revoked,
            created_at,
        }
    }

    pub fn id(&self) -> &str {
        &self.prefix
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn secret_hash(&self) -> &str {
        &self.secret_hash
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    pub fn revoked(&self) -> bool {
        self.revoked
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub(crate) fn set_revoked(&mut self, revoked: bool) {
        self.revoked = revoked;
    }
}

impl fmt::Debug for KeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRecord")
            .field("prefix", &self.prefix)
            .field("secret_hash", &"<redacted>")
            .field("owner", &self.owner)
            .field("revoked", &self.revoked)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Listing view of a key. Carries no secret material or digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyMetadata {
    pub prefix: String,
    pub owner: OwnerId,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&KeyRecord> for KeyMetadata {
    fn from(record: &KeyRecord) -> Self {
        Self {
            prefix: record.prefix.clone(),
            owner: record.owner.clone(),
            revoked: record.revoked,
            created_at: record.created_at,
        }
    }
}

//! Persistence seam for key records.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{ApiKeyError, Result};
use crate::record::{KeyRecord, OwnerId};

/// Storage backend for key records.
///
/// Implementations must enforce prefix uniqueness atomically inside
/// `insert` and report a clash as `ApiKeyError::DuplicatePrefix`. Each
/// mutating verb touches a single record.
pub trait KeyRepository: Send + Sync {
    /// Persist a new record.
    fn insert(&self, record: KeyRecord) -> Result<()>;

    /// Indexed lookup by prefix.
    fn find_by_prefix(&self, prefix: &str) -> Result<Option<KeyRecord>>;

    /// Set the revoked flag. Returns `false` when no record has this prefix.
    fn set_revoked(&self, prefix: &str, revoked: bool) -> Result<bool>;

    /// All records belonging to `owner`, newest first.
    fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<KeyRecord>>;

    /// Every record, newest first.
    fn list_all(&self) -> Result<Vec<KeyRecord>>;

    /// Remove a record. Returns `false` when no record has this prefix.
    fn delete(&self, prefix: &str) -> Result<bool>;
}

impl<R: KeyRepository + ?Sized> KeyRepository for Arc<R> {
    fn insert(&self, record: KeyRecord) -> Result<()> {
        (**self).insert(record)
    }

    fn find_by_prefix(&self, prefix: &str) -> Result<Option<KeyRecord>> {
        (**self).find_by_prefix(prefix)
    }

    fn set_revoked(&self, prefix: &str, revoked: bool) -> Result<bool> {
        (**self).set_revoked(prefix, revoked)
    }

    fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<KeyRecord>> {
        (**self).list_by_owner(owner)
    }

    fn list_all(&self) -> Result<Vec<KeyRecord>> {
        (**self).list_all()
    }

    fn delete(&self, prefix: &str) -> Result<bool> {
        (**self).delete(prefix)
    }
}

/// Thread-safe in-memory repository keyed by prefix.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    records: RwLock<HashMap<String, KeyRecord>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> ApiKeyError {
    ApiKeyError::Storage("key repository lock poisoned".to_string())
}

fn newest_first(mut records: Vec<KeyRecord>) -> Vec<KeyRecord> {
    records.sort_by(|a, b| {
        b.created_at()
            .cmp(&a.created_at())
            .then_with(|| a.prefix().cmp(b.prefix()))
    });
    records
}

impl KeyRepository for MemoryRepository {
    fn insert(&self, record: KeyRecord) -> Result<()> {
        let mut records = self.records.write().map_err(poisoned)?;
        if records.contains_key(record.prefix()) {
            return Err(ApiKeyError::DuplicatePrefix);
        }
        records.insert(record.prefix().to_owned(), record);
        Ok(())
    }

    fn find_by_prefix(&self, prefix: &str) -> Result<Option<KeyRecord>> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records.get(prefix).cloned())
    }

    fn set_revoked(&self, prefix: &str, revoked: bool) -> Result<bool> {
        let mut records = self.records.write().map_err(poisoned)?;
        match records.get_mut(prefix) {
            Some(record) => {
                record.set_revoked(revoked);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn list_by_owner(&self, owner: &OwnerId) -> Result<Vec<KeyRecord>> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(newest_first(
            records
                .values()
                .filter(|r| r.owner() == owner)
                .cloned()
                .collect(),
        ))
    }

    fn list_all(&self) -> Result<Vec<KeyRecord>> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(newest_first(records.values().cloned().collect()))
    }

    fn delete(&self, prefix: &str) -> Result<bool> {
        let mut records = self.records.write().map_err(poisoned)?;
        Ok(records.remove(prefix).is_some())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;

    fn record(prefix: &str, owner: &str) -> KeyRecord {
        KeyRecord::new(prefix, "digest", OwnerId::new(owner), Utc::now())
    }

    #[test]
    fn test_insert_and_find() {
        let repo = MemoryRepository::new();
        repo.insert(record("aaaaaaaa", "u1")).unwrap();

        let found = repo.find_by_prefix("aaaaaaaa").unwrap().unwrap();
        assert_eq!(found.owner().as_str(), "u1");
        assert!(repo.find_by_prefix("bbbbbbbb").unwrap().is_none());
    }

    #[test]
    fn test_insert_duplicate_prefix() {
        let repo = MemoryRepository::new();
        repo.insert(record("aaaaaaaa", "u1")).unwrap();
        let result = repo.insert(record("aaaaaaaa", "u2"));
        assert!(matches!(result, Err(ApiKeyError::DuplicatePrefix)));

        // The original record is untouched
        let found = repo.find_by_prefix("aaaaaaaa").unwrap().unwrap();
        assert_eq!(found.owner().as_str(), "u1");
    }

    #[test]
    fn test_set_revoked() {
        let repo = MemoryRepository::new();
        repo.insert(record("aaaaaaaa", "u1")).unwrap();

        assert!(repo.set_revoked("aaaaaaaa", true).unwrap());
        assert!(repo.find_by_prefix("aaaaaaaa").unwrap().unwrap().revoked());
        assert!(!repo.set_revoked("missing", true).unwrap());
    }

    #[test]
    fn test_list_by_owner_newest_first() {
        let repo = MemoryRepository::new();
        let now = Utc::now();
        repo.insert(KeyRecord::new("old", "d", OwnerId::new("u1"), now - Duration::minutes(5)))
            .unwrap();
        repo.insert(KeyRecord::new("new", "d", OwnerId::new("u1"), now))
            .unwrap();
        repo.insert(record("other", "u2")).unwrap();

        let listed = repo.list_by_owner(&OwnerId::new("u1")).unwrap();
        let prefixes: Vec<_> = listed.iter().map(|r| r.prefix()).collect();
        assert_eq!(prefixes, ["new", "old"]);
        assert_eq!(repo.list_all().unwrap().len(), 3);
    }

    #[test]
    fn test_delete() {
        let repo = MemoryRepository::new();
        repo.insert(record("aaaaaaaa", "u1")).unwrap();

        assert!(repo.delete("aaaaaaaa").unwrap());
        assert!(!repo.delete("aaaaaaaa").unwrap());
        assert!(repo.is_empty());
    }

    #[test]
    fn test_shared_through_arc() {
        let repo = Arc::new(MemoryRepository::new());
        let handle: Arc<dyn KeyRepository> = repo.clone();
        handle.insert(record("aaaaaaaa", "u1")).unwrap();
        assert_eq!(repo.len(), 1);
    }
}

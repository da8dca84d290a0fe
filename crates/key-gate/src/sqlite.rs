//! SQLite-backed key repository.
//!
//! Prefix uniqueness is a primary-key constraint, so two concurrent creates
//! can never both insert the same prefix. The digest column is guarded by a
//! trigger and cannot be rewritten once stored.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use api_key::{ApiKeyError, KeyRecord, KeyRepository, OwnerId};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, ffi, params};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS APIKeys (
    prefix TEXT PRIMARY KEY NOT NULL,
    secret_hash TEXT NOT NULL,
    owner TEXT NOT NULL,
    revoked BOOLEAN NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_apikeys_owner ON APIKeys(owner);
CREATE TRIGGER IF NOT EXISTS trg_apikeys_hash_immutable
BEFORE UPDATE OF secret_hash ON APIKeys
WHEN NEW.secret_hash IS NOT OLD.secret_hash
BEGIN
    SELECT RAISE(ABORT, 'secret_hash is immutable');
END;
"#;

const SELECT_COLUMNS: &str = "SELECT prefix, secret_hash, owner, revoked, created_at FROM APIKeys";

/// Key repository stored in a single SQLite file.
pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

impl SqliteRepository {
    /// Open (or create) the database at `path` and ensure the schema exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, rusqlite::Error> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    ) -> api_key::Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| ApiKeyError::Storage("sqlite connection lock poisoned".to_string()))?;
        f(&conn).map_err(storage_error)
    }

    fn query_records(&self, sql: &str, owner: Option<&OwnerId>) -> api_key::Result<Vec<KeyRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = match owner {
                Some(owner) => stmt.query_map([owner.as_str()], record_from_row)?,
                None => stmt.query_map([], record_from_row)?,
            };
            rows.collect()
        })
    }
}

fn storage_error(e: rusqlite::Error) -> ApiKeyError {
    log::error!("API key database error: {}", e);
    ApiKeyError::Storage(e.to_string())
}

fn record_from_row(row: &Row<'_>) -> Result<KeyRecord, rusqlite::Error> {
    let owner: String = row.get(2)?;
    let created_at: DateTime<Utc> = row.get(4)?;
    Ok(KeyRecord::from_parts(
        row.get::<_, String>(0)?,
        row.get::<_, String>(1)?,
        OwnerId::new(owner),
        row.get(3)?,
        created_at,
    ))
}

impl KeyRepository for SqliteRepository {
    fn insert(&self, record: KeyRecord) -> api_key::Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| ApiKeyError::Storage("sqlite connection lock poisoned".to_string()))?;
        let result = conn.execute(
            "INSERT INTO APIKeys (prefix, secret_hash, owner, revoked, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.prefix(),
                record.secret_hash(),
                record.owner().as_str(),
                record.revoked(),
                record.created_at(),
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.extended_code == ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
            {
                Err(ApiKeyError::DuplicatePrefix)
            }
            Err(e) => Err(storage_error(e)),
        }
    }

    fn find_by_prefix(&self, prefix: &str) -> api_key::Result<Option<KeyRecord>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("{SELECT_COLUMNS} WHERE prefix = ?1"),
                [prefix],
                record_from_row,
            )
            .optional()
        })
    }

    fn set_revoked(&self, prefix: &str, revoked: bool) -> api_key::Result<bool> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE APIKeys SET revoked = ?1 WHERE prefix = ?2",
                params![revoked, prefix],
            )?;
            Ok(updated > 0)
        })
    }

    fn list_by_owner(&self, owner: &OwnerId) -> api_key::Result<Vec<KeyRecord>> {
        self.query_records(
            &format!("{SELECT_COLUMNS} WHERE owner = ?1 ORDER BY created_at DESC, prefix"),
            Some(owner),
        )
    }

    fn list_all(&self) -> api_key::Result<Vec<KeyRecord>> {
        self.query_records(
            &format!("{SELECT_COLUMNS} ORDER BY created_at DESC, prefix"),
            None,
        )
    }

    fn delete(&self, prefix: &str) -> api_key::Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM APIKeys WHERE prefix = ?1", [prefix])?;
            Ok(deleted > 0)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use api_key::{ApiKeyConfig, HasherConfig, KeyStore};
    use chrono::Duration as ChronoDuration;
    use tempfile::NamedTempFile;

    use super::*;

    fn record(prefix: &str, owner: &str) -> KeyRecord {
        KeyRecord::new(prefix, "$argon2id$digest", OwnerId::new(owner), Utc::now())
    }

    #[test]
    fn test_insert_and_find() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let inserted = record("aaaaaaaa", "acct-1");
        repo.insert(inserted.clone()).unwrap();

        let found = repo.find_by_prefix("aaaaaaaa").unwrap().unwrap();
        assert_eq!(found.prefix(), "aaaaaaaa");
        assert_eq!(found.secret_hash(), "$argon2id$digest");
        assert_eq!(found.owner().as_str(), "acct-1");
        assert!(!found.revoked());
        assert_eq!(found.created_at(), inserted.created_at());

        assert!(repo.find_by_prefix("missing").unwrap().is_none());
    }

    #[test]
    fn test_duplicate_prefix() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        repo.insert(record("aaaaaaaa", "acct-1")).unwrap();
        let result = repo.insert(record("aaaaaaaa", "acct-2"));
        assert!(matches!(result, Err(ApiKeyError::DuplicatePrefix)));
    }

    #[test]
    fn test_set_revoked_and_delete() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        repo.insert(record("aaaaaaaa", "acct-1")).unwrap();

        assert!(repo.set_revoked("aaaaaaaa", true).unwrap());
        assert!(repo.find_by_prefix("aaaaaaaa").unwrap().unwrap().revoked());
        assert!(!repo.set_revoked("missing", true).unwrap());

        assert!(repo.delete("aaaaaaaa").unwrap());
        assert!(!repo.delete("aaaaaaaa").unwrap());
    }

    #[test]
    fn test_other_constraint_failures_are_storage_errors() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        repo.conn
            .lock()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER trg_reject BEFORE INSERT ON APIKeys \
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();

        let result = repo.insert(record("aaaaaaaa", "acct-1"));
        assert!(matches!(result, Err(ApiKeyError::Storage(_))));
    }

    #[test]
    fn test_secret_hash_is_immutable() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        repo.insert(record("aaaaaaaa", "acct-1")).unwrap();

        let conn = repo.conn.lock().unwrap();
        let result = conn.execute(
            "UPDATE APIKeys SET secret_hash = 'other' WHERE prefix = 'aaaaaaaa'",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_list_ordering_and_owner_filter() {
        let repo = SqliteRepository::open_in_memory().unwrap();
        let now = Utc::now();
        repo.insert(KeyRecord::new(
            "older",
            "d",
            OwnerId::new("acct-1"),
            now - ChronoDuration::minutes(10),
        ))
        .unwrap();
        repo.insert(KeyRecord::new("newer", "d", OwnerId::new("acct-1"), now))
            .unwrap();
        repo.insert(record("others", "acct-2")).unwrap();

        let listed = repo.list_by_owner(&OwnerId::new("acct-1")).unwrap();
        let prefixes: Vec<_> = listed.iter().map(|r| r.prefix().to_owned()).collect();
        assert_eq!(prefixes, ["newer", "older"]);
        assert_eq!(repo.list_all().unwrap().len(), 3);
    }

    #[test]
    fn test_concurrent_create_and_verify_on_one_file() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 25;

        let file = NamedTempFile::new().unwrap();
        let config = ApiKeyConfig::default().with_hasher(HasherConfig::new(256, 1, 1));
        SqliteRepository::open(file.path()).unwrap();

        thread::scope(|s| {
            for t in 0..THREADS {
                let path = file.path();
                let config = &config;
                s.spawn(move || {
                    // Own connection per thread; uniqueness is the database's job.
                    let repo = Arc::new(SqliteRepository::open(path).unwrap());
                    let store = KeyStore::new(repo, config).unwrap();
                    let verifier = store.verification_service();
                    let owner = OwnerId::new(format!("acct-{t}"));
                    for _ in 0..PER_THREAD {
                        let created = store.create(&owner).unwrap();
                        assert_eq!(verifier.verify(created.plaintext.expose()).unwrap(), owner);
                    }
                });
            }
        });

        let repo = SqliteRepository::open(file.path()).unwrap();
        assert_eq!(repo.list_all().unwrap().len(), THREADS * PER_THREAD);
        assert_eq!(
            repo.list_by_owner(&OwnerId::new("acct-0")).unwrap().len(),
            PER_THREAD
        );
    }

    #[test]
    fn test_concurrent_create_on_shared_repository() {
        const THREADS: usize = 8;
        const PER_THREAD: usize = 25;

        let repo = Arc::new(SqliteRepository::open_in_memory().unwrap());
        let config = ApiKeyConfig::default().with_hasher(HasherConfig::new(256, 1, 1));
        let store = KeyStore::new(repo.clone(), &config).unwrap();
        let verifier = store.verification_service();

        thread::scope(|s| {
            for t in 0..THREADS {
                let store = &store;
                let verifier = &verifier;
                s.spawn(move || {
                    let owner = OwnerId::new(format!("acct-{t}"));
                    for _ in 0..PER_THREAD {
                        let created = store.create(&owner).unwrap();
                        assert_eq!(verifier.verify(created.plaintext.expose()).unwrap(), owner);
                    }
                });
            }
        });

        assert_eq!(repo.list_all().unwrap().len(), THREADS * PER_THREAD);
    }

    #[test]
    fn test_persists_across_connections() {
        let file = NamedTempFile::new().unwrap();
        let config = ApiKeyConfig::default().with_hasher(HasherConfig::new(256, 1, 1));

        let created = {
            let repo = Arc::new(SqliteRepository::open(file.path()).unwrap());
            let store = KeyStore::new(repo, &config).unwrap();
            store.create(&OwnerId::new("acct-1")).unwrap()
        };

        let repo = Arc::new(SqliteRepository::open(file.path()).unwrap());
        let store = KeyStore::new(repo, &config).unwrap();
        let verifier = store.verification_service();
        assert_eq!(
            verifier.verify(created.plaintext.expose()).unwrap().as_str(),
            "acct-1"
        );
    }
}

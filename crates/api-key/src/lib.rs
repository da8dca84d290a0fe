//! Issuing, storing, revoking and verifying API keys.
//!
//! This crate provides functionality for:
//! - Generating keys with a short public lookup prefix and a 256-bit secret
//! - Hashing secrets with Argon2id so stored digests resist offline guessing
//! - Managing the key lifecycle over a pluggable [`KeyRepository`]
//! - Verifying presented keys without revealing why a key was refused
//!
//! # Key Format
//!
//! Keys follow the format: `{prefix}.{secret}`, both parts lowercase base32.
//!
//! Example: `mfrggzdf.nbswy3dpeb3w64tmmqqgc3tdmvzs...`
//!
//! # Security Features
//!
//! - OS random source only; generation fails rather than degrading
//! - Salted, memory-hard digests with constant-time comparison
//! - Plaintext exists only in the creation result and is wiped on drop
//! - Malformed, unknown, revoked and wrong-secret keys all look the same
//!   from outside and cost the same to refuse
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use api_key::{ApiKeyConfig, HasherConfig, KeyStore, MemoryRepository, OwnerId};
//!
//! let config = ApiKeyConfig::default().with_hasher(HasherConfig::new(256, 1, 1));
//! let store = KeyStore::new(Arc::new(MemoryRepository::new()), &config).unwrap();
//! let verifier = store.verification_service();
//!
//! // Give the plaintext to the user (only shown once!)
//! let owner = OwnerId::new("acct-42");
//! let created = store.create(&owner).unwrap();
//!
//! // Later, verify the presented key
//! assert_eq!(verifier.verify(created.plaintext.expose()).unwrap(), owner);
//!
//! store.revoke(&created.metadata.prefix).unwrap();
//! assert!(verifier.verify(created.plaintext.expose()).is_err());
//! ```

mod codec;
mod config;
mod entropy;
mod error;
mod hasher;
mod record;
mod repository;
mod store;
mod verify;

// Public re-exports
pub use codec::{DELIMITER, DecodedKey, GeneratedKey, KeyCodec, MAX_KEY_LEN, PlaintextKey, Secret};
pub use config::{ApiKeyConfig, HasherConfig};
pub use entropy::{Entropy, EntropySource};
pub use error::{ApiKeyError, Result};
pub use hasher::KeyHasher;
pub use record::{KeyMetadata, KeyRecord, OwnerId};
pub use repository::{KeyRepository, MemoryRepository};
pub use store::{CreatedKey, KeyFilter, KeyStore};
pub use verify::{Rejection, VerificationService};

//! Key generation and the `prefix.secret` wire format.

use std::fmt;

use data_encoding::BASE32_NOPAD;
use zeroize::{Zeroize, Zeroizing};

use crate::config::ApiKeyConfig;
use crate::entropy::Entropy;
use crate::error::{ApiKeyError, Result};

/// Separates prefix and secret. Never part of the base32 alphabet.
pub const DELIMITER: char = '.';

/// Upper bound on the length of a presented key.
pub const MAX_KEY_LEN: usize = 256;

/// Secret half of a key. Cleared from memory on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl Drop for Secret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// The full `prefix.secret` string handed to the key holder.
///
/// Exists only in the return value of key creation; it is never persisted
/// and cannot be rebuilt from a stored record.
#[derive(Clone, PartialEq, Eq)]
pub struct PlaintextKey(String);

impl PlaintextKey {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PlaintextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PlaintextKey(***)")
    }
}

impl Drop for PlaintextKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Output of [`KeyCodec::generate`].
#[derive(Debug)]
pub struct GeneratedKey {
    plaintext: PlaintextKey,
    prefix: String,
    secret: Secret,
}

impl GeneratedKey {
    pub fn plaintext(&self) -> &PlaintextKey {
        &self.plaintext
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn secret(&self) -> &Secret {
        &self.secret
    }

    /// Keep only the plaintext; the separate secret copy is wiped.
    pub fn into_plaintext(self) -> PlaintextKey {
        self.plaintext
    }
}

/// Output of [`KeyCodec::decode`].
#[derive(Debug)]
pub struct DecodedKey {
    prefix: String,
    secret: Secret,
}

impl DecodedKey {
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn secret(&self) -> &Secret {
        &self.secret
    }
}

/// Generates fresh keys and splits presented ones.
#[derive(Debug, Clone)]
pub struct KeyCodec {
    prefix_bytes: usize,
    secret_bytes: usize,
    entropy: Entropy,
}

impl KeyCodec {
    pub fn new(config: &ApiKeyConfig) -> Self {
        Self {
            prefix_bytes: config.prefix_bytes,
            secret_bytes: config.secret_bytes,
            entropy: Entropy::default(),
        }
    }

    pub fn with_entropy(mut self, entropy: Entropy) -> Self {
        self.entropy = entropy;
        self
    }

    /// Draw a new prefix and an independent secret from the random source.
    ///
    /// Both parts are lowercase base32 (no padding). Fails with
    /// `EntropySourceUnavailable` rather than falling back to a weaker source.
    pub fn generate(&self) -> Result<GeneratedKey> {
        let prefix = random_token(&self.entropy, self.prefix_bytes)?;
        let secret = Secret::new(random_token(&self.entropy, self.secret_bytes)?);

        let mut plaintext = String::with_capacity(prefix.len() + 1 + secret.0.len());
        plaintext.push_str(&prefix);
        plaintext.push(DELIMITER);
        plaintext.push_str(secret.expose());

        Ok(GeneratedKey {
            plaintext: PlaintextKey(plaintext),
            prefix,
            secret,
        })
    }

    /// Split a presented key into prefix and secret.
    ///
    /// Exactly one delimiter is allowed, and both parts must be non-empty
    /// printable ASCII without whitespace.
    pub fn decode(presented: &str) -> Result<DecodedKey> {
        if presented.len() > MAX_KEY_LEN {
            return Err(ApiKeyError::MalformedKey);
        }

        let mut parts = presented.split(DELIMITER);
        let (Some(prefix), Some(secret), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(ApiKeyError::MalformedKey);
        };

        if !is_valid_part(prefix) || !is_valid_part(secret) {
            return Err(ApiKeyError::MalformedKey);
        }

        Ok(DecodedKey {
            prefix: prefix.to_owned(),
            secret: Secret::new(secret),
        })
    }
}

fn is_valid_part(part: &str) -> bool {
    !part.is_empty() && part.bytes().all(|b| b.is_ascii_graphic())
}

fn random_token(entropy: &Entropy, len: usize) -> Result<String> {
    let mut bytes = Zeroizing::new(vec![0u8; len]);
    entropy.fill(bytes.as_mut_slice())?;

    let mut encoded = BASE32_NOPAD.encode(bytes.as_slice());
    encoded.make_ascii_lowercase();
    Ok(encoded)
}

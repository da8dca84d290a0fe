use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use api_key::ApiKeyConfig;
use serde::Deserialize;

use crate::error::{Error, Result};

pub const DEFAULT_LISTEN: &str = "0.0.0.0:8080";
pub const DEFAULT_API_KEY_HEADER: &str = "x-api-key";
pub const DEFAULT_OWNER_HEADER: &str = "x-api-key-owner";

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Required for `serve`; admin commands only touch the database.
    #[serde(default)]
    pub upstream: Option<UpstreamConfig>,
    /// SQLite file holding the key records.
    pub database: String,
    #[serde(default)]
    pub api_key: ApiKeyConfig,
    /// Request header carrying the presented key.
    #[serde(default = "default_header")]
    pub header: String,
    /// Header injected towards the upstream with the authenticated owner.
    #[serde(default = "default_owner_header")]
    pub owner_header: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    pub ip: String,
    pub port: u16,
    #[serde(default)]
    pub tls: bool,
    #[serde(default)]
    pub sni: String,
}

impl UpstreamConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

fn default_listen() -> String {
    DEFAULT_LISTEN.to_string()
}

fn default_header() -> String {
    DEFAULT_API_KEY_HEADER.to_string()
}

fn default_owner_header() -> String {
    DEFAULT_OWNER_HEADER.to_string()
}

impl ServerConfig {
    /// Read, parse and validate a YAML config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        let mut config: ServerConfig = serde_yaml::from_str(&raw)?;
        config.header.make_ascii_lowercase();
        config.owner_header.make_ascii_lowercase();
        config.validate()?;
        Ok(config)
    }

    /// Resolve the database path against the directory holding the config.
    pub fn database_path(&self, base_path: &Path) -> PathBuf {
        let db = Path::new(&self.database);
        if db.is_absolute() {
            db.to_path_buf()
        } else {
            base_path.join(db)
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.listen.parse::<SocketAddr>().is_err() {
            return Err(Error::InvalidConfig(format!(
                "listen address {:?} is not ip:port",
                self.listen
            )));
        }
        if self.database.trim().is_empty() {
            return Err(Error::InvalidConfig("database path is empty".to_string()));
        }
        if self.header.is_empty() || self.owner_header.is_empty() {
            return Err(Error::InvalidConfig("header names must not be empty".to_string()));
        }
        if self.header == self.owner_header {
            return Err(Error::InvalidConfig(
                "header and owner_header must differ".to_string(),
            ));
        }
        if let Some(upstream) = &self.upstream {
            if upstream.ip.trim().is_empty() || upstream.port == 0 {
                return Err(Error::InvalidConfig(format!(
                    "invalid upstream address {}",
                    upstream.addr()
                )));
            }
            if upstream.tls && upstream.sni.is_empty() {
                return Err(Error::InvalidConfig(
                    "tls upstream requires sni".to_string(),
                ));
            }
        }
        self.api_key.validate()?;
        Ok(())
    }

    pub fn require_upstream(&self) -> Result<&UpstreamConfig> {
        self.upstream
            .as_ref()
            .ok_or_else(|| Error::InvalidConfig("serve requires an upstream".to_string()))
    }
}

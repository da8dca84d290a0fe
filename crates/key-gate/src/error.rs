//! Error types for the key gateway.

use api_key::ApiKeyError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Key(#[from] ApiKeyError),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("failed to render JSON: {0}")]
    Render(#[from] serde_json::Error),

    #[error("server error: {0}")]
    Server(#[from] Box<pingora::prelude::Error>),

    #[error("refusing to {0} without --yes")]
    NotConfirmed(&'static str),
}

pub type Result<T> = std::result::Result<T, Error>;

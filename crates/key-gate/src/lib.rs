//! API key gateway: a SQLite key store, an admin console, and a pingora
//! reverse proxy that authenticates every request before forwarding it.

pub mod admin;
pub mod configuration;
pub mod error;
pub mod gateway;
pub mod metric;
pub mod server;
pub mod sqlite;

pub use error::{Error, Result};

//! Startup error type shared across the workspace
//!
//! Covers everything that can go wrong before the pool is serving:
//! gateway config parsing and validation, credential-file loading, and
//! shared-secret decoding. Runtime failures carry their own taxonomies
//! (`SessionError`, `ResolutionError`) closer to where they happen.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Gateway configuration failed validation.
    #[error("configuration error: {0}")]
    Config(String),

    /// Credential file was unreadable, unparseable, or holds bad records.
    #[error("credential error: {0}")]
    Credentials(String),

    /// A bot's base64 shared secret could not be decoded.
    #[error("invalid shared secret: {0}")]
    InvalidSecret(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

//! Crate error types.

use thiserror::Error;

/// Errors raised while loading or validating [`Settings`](crate::config::Settings).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to extract settings: {0}")]
    Figment(#[from] Box<figment::Error>),

    #[error("invalid url_prefix {0:?}: must be a non-root path without pattern characters")]
    InvalidUrlPrefix(String),

    #[error("cache.max_entries must be at least 1")]
    InvalidMaxEntries,
}

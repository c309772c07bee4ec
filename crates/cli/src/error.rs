//! CLI error types.

use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;

/// CLI errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// No chat has been recorded yet.
    #[error("database not found at {path}. Run 'musezen chat' first")]
    DatabaseNotFound { path: PathBuf },

    #[error("no session found matching '{prefix}'")]
    SessionNotFound { prefix: String },

    /// The user should provide a longer prefix to disambiguate.
    #[error("multiple sessions match '{prefix}': {matches:?}")]
    AmbiguousSession {
        prefix: String,
        matches: Vec<String>,
    },

    #[error("unsupported image {path}: upload a png, jpg or jpeg file")]
    UnsupportedImage { path: PathBuf },

    #[error("no style classifier configured; add a [classifier] section to musezen.toml or use /style <label>")]
    NoClassifier,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Runtime(#[from] runtime::Error),

    #[error(transparent)]
    Classify(#[from] runtime::ClassifyError),

    #[error(transparent)]
    Storage(#[from] storage::Error),

    #[error(transparent)]
    Artsy(#[from] artsy::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

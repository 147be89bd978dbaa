//! Error type for the fallible edges of the lookup coordinator.
//!
//! Lookups themselves never fail: invalid input resolves with an empty
//! result and a lost context drops its callbacks. These errors cover
//! construction and loading only.

use std::path::PathBuf;

/// Error type for reverse lookup setup.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("Failed to spawn background context: {0}")]
    Spawn(String),
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config: {0}")]
    Config(#[from] serde_json::Error),
    #[error("Invalid public suffix list: {0}")]
    Psl(String),
    #[error("No tokio runtime available: {0}")]
    Runtime(#[from] tokio::runtime::TryCurrentError),
}

impl LookupError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

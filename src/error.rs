//! Typed errors for the persistence, provider, and runner boundaries.
//!
//! Everything above these boundaries (CLI dispatch, config loading) uses
//! `anyhow`; these enums exist where callers need to match on the failure.

use thiserror::Error;

/// Failure in the JSON key/value store.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid storage key {0:?}")]
    InvalidKey(String),

    #[error("storage I/O failed at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode {path}: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode value for {path}: {source}")]
    Encode {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure while talking to an LLM provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The request could not be sent or the connection broke.
    #[error("provider transport error: {0}")]
    Transport(String),

    /// The response stream contained something we could not interpret.
    #[error("malformed provider stream: {0}")]
    Malformed(String),
}

/// Terminal failures of a run. Everything else becomes conversation data.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("corrupt history for session {session}: {source}")]
    History {
        session: String,
        #[source]
        source: StorageError,
    },
}

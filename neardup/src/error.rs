use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DedupError>;

/// Errors surfaced by the deduplication engine.
///
/// Per-line problems (malformed JSON, empty token sets) are skip policies,
/// not errors; they are logged where they occur and never reach this type.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DedupError {
    /// Invalid parameters, rejected before any I/O.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("io error at {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A signature file that cannot be decoded; the coordinator skips the
    /// file and continues with the next one.
    #[error("corrupt signature file {path:?}: {reason}")]
    SignatureFile { path: PathBuf, reason: String },

    /// A bloom backing file whose header does not match the configured
    /// index parameters. Fatal at startup.
    #[error("bloom backing file {path:?}: {reason}")]
    BloomHeader { path: PathBuf, reason: String },

    #[error("redis backend error")]
    Redis(#[from] redis::RedisError),

    #[error("duplicate log error")]
    Csv(#[from] csv::Error),
}

impl DedupError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DedupError::Io {
            path: path.into(),
            source,
        }
    }
}

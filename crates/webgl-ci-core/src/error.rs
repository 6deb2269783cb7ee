//! Error taxonomy for WebGL CI primitives.

use std::path::PathBuf;

/// Errors produced by the core building blocks.
#[derive(Debug, thiserror::Error)]
pub enum WebglCiError {
    #[error("command has no program: {0}")]
    EmptyCommand(String),

    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to find the revision of Chromium")]
    RevisionNotFound,

    #[error("no run of {streak} consecutive successful builds found")]
    NoSuccessStreak { streak: usize },

    #[error("no artifact matching `{pattern}` in {dir:?}")]
    ArtifactNotFound { dir: PathBuf, pattern: String },

    #[error("invalid result log: {0}")]
    InvalidResultLog(String),

    #[error("failed to fetch {url}: {message}")]
    Http { url: String, message: String },

    #[error("failed to send mail: {0}")]
    Mail(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, WebglCiError>;

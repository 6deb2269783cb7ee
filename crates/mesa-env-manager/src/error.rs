//! Error types for mesa-env-manager

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while selecting a Mesa build
#[derive(Error, Debug)]
pub enum MesaError {
    /// Requested revision is not installed
    #[error("Could not find mesa build {0}")]
    BuildNotFound(String),

    /// Install directory holds no Mesa builds at all
    #[error("No mesa builds installed in {0:?}")]
    NoBuilds(PathBuf),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Pattern error
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

//! Mesa-Env-Manager: graphics driver selection for WebGL CI
//!
//! Mesa builds are installed side by side as
//! `<install_dir>/mesa-master-release-<revision>-<suffix>`. This crate finds
//! the build to test against and produces the environment that makes the
//! browser load its drivers instead of the system ones.

pub mod error;
pub mod install;

pub use error::MesaError;
pub use install::{MesaBuild, MesaInstall, MesaSelection, DEFAULT_INSTALL_DIR};

/// Result type for Mesa environment operations
pub type Result<T> = std::result::Result<T, MesaError>;

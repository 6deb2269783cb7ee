//! Discovery of numbered build artifacts on disk.
//!
//! Packaged Chromium builds are stored as `<commit-position>.zip`; the
//! newest artifact is the one with the greatest number.

use crate::error::{Result, WebglCiError};
use regex::Regex;
use std::path::Path;
use tracing::debug;

/// Pattern of a packaged Chromium build.
pub const CHROME_PACKAGE_PATTERN: &str = r"^(\d{6,})\.zip$";

/// A directory entry whose name carries a revision number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberedArtifact {
    pub file_name: String,
    pub number: u64,
}

/// Find the entry of `dir` with the greatest number captured by `pattern`.
///
/// `pattern` must contain one capture group matching a decimal number.
pub fn latest_numbered(dir: &Path, pattern: &Regex) -> Result<NumberedArtifact> {
    let mut latest: Option<NumberedArtifact> = None;

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_name = entry.file_name().to_string_lossy().to_string();
        let Some(number) = pattern
            .captures(&file_name)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u64>().ok())
        else {
            continue;
        };

        if latest.as_ref().map_or(true, |l| number > l.number) {
            latest = Some(NumberedArtifact { file_name, number });
        }
    }

    let latest = latest.ok_or_else(|| WebglCiError::ArtifactNotFound {
        dir: dir.to_path_buf(),
        pattern: pattern.as_str().to_string(),
    })?;
    debug!(dir = ?dir, file = %latest.file_name, "found latest artifact");
    Ok(latest)
}

/// Whether `file_name` names a packaged Chromium build.
pub fn is_chrome_package(file_name: &str) -> bool {
    Regex::new(CHROME_PACKAGE_PATTERN)
        .map(|re| re.is_match(file_name))
        .unwrap_or(false)
}

/// Newest packaged Chromium build in `build_dir`.
pub fn latest_chrome_package(build_dir: &Path) -> Result<NumberedArtifact> {
    let pattern = Regex::new(CHROME_PACKAGE_PATTERN)?;
    latest_numbered(build_dir, &pattern)
}

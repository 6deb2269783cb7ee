//! Chromium revision identity.
//!
//! A revision is a git hash plus the monotonically increasing commit
//! position that names packaged builds (`<position>.zip`).

pub mod lkgr;

use crate::error::{Result, WebglCiError};
use regex::Regex;
use std::fmt;

/// A Chromium checkout revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChromiumRevision {
    /// Full commit hash.
    pub hash: String,

    /// `Cr-Commit-Position` number.
    pub commit_position: u64,
}

impl fmt::Display for ChromiumRevision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (#{})", self.hash, self.commit_position)
    }
}

/// Parse the output of `git log --shortstat -1`.
///
/// The hash comes from the `commit <hash>` header and the position from the
/// `Cr-Commit-Position` footer. Both must be present.
pub fn parse_git_log(output: &str) -> Result<ChromiumRevision> {
    let commit_re = Regex::new(r"^commit ([0-9a-f]+)")?;
    let position_re = Regex::new(r"Cr-Commit-Position: refs/heads/(?:master|main)@\{#(\d+)\}")?;

    let mut hash = None;
    for line in output.lines() {
        if let Some(caps) = commit_re.captures(line) {
            hash = Some(caps[1].to_string());
        }
        if let Some(caps) = position_re.captures(line) {
            let commit_position = caps[1]
                .parse::<u64>()
                .map_err(|_| WebglCiError::RevisionNotFound)?;
            return match hash {
                Some(hash) => Ok(ChromiumRevision {
                    hash,
                    commit_position,
                }),
                None => Err(WebglCiError::RevisionNotFound),
            };
        }
    }

    Err(WebglCiError::RevisionNotFound)
}

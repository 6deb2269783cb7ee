//! Host platform detection.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Operating system the pipeline runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostOs {
    Linux,
    Windows,
    Darwin,
}

impl HostOs {
    /// Detect the current host. Unknown unix-likes are treated as Linux.
    pub fn current() -> Self {
        match std::env::consts::OS {
            "windows" => HostOs::Windows,
            "macos" => HostOs::Darwin,
            _ => HostOs::Linux,
        }
    }

    /// Separator between `PATH` entries.
    pub fn path_separator(&self) -> char {
        match self {
            HostOs::Windows => ';',
            HostOs::Linux | HostOs::Darwin => ':',
        }
    }

    /// Relative path of the Chromium binary inside an unpacked build.
    pub fn chrome_binary(&self) -> &'static str {
        match self {
            HostOs::Windows => r"out\Default\chrome.exe",
            HostOs::Linux | HostOs::Darwin => "out/Default/chrome",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HostOs::Linux => "linux",
            HostOs::Windows => "windows",
            HostOs::Darwin => "darwin",
        }
    }
}

impl fmt::Display for HostOs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_separator() {
        assert_eq!(HostOs::Windows.path_separator(), ';');
        assert_eq!(HostOs::Linux.path_separator(), ':');
        assert_eq!(HostOs::Darwin.path_separator(), ':');
    }

    #[test]
    fn test_chrome_binary() {
        assert_eq!(HostOs::Linux.chrome_binary(), "out/Default/chrome");
        assert!(HostOs::Windows.chrome_binary().ends_with("chrome.exe"));
    }

    #[test]
    fn test_display() {
        assert_eq!(HostOs::Darwin.to_string(), "darwin");
    }
}

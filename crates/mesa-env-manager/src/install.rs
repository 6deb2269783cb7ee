//! Installed Mesa builds
//!
//! Locates builds by revision and exposes the driver environment variables.

use crate::error::MesaError;
use crate::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Where daily Mesa builds are installed.
pub const DEFAULT_INSTALL_DIR: &str = "/workspace/install";

/// Directory name prefix shared by all builds.
const BUILD_PREFIX: &str = "mesa-master-release-";

/// Which Mesa to test against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MesaSelection {
    /// Use whatever driver the system provides
    System,
    /// Newest installed build
    Latest,
    /// A specific revision
    Revision(String),
}

impl MesaSelection {
    /// Parse `system`, `latest` or a revision.
    pub fn parse(value: &str) -> Self {
        match value {
            "system" => MesaSelection::System,
            "latest" => MesaSelection::Latest,
            rev => MesaSelection::Revision(rev.to_string()),
        }
    }
}

impl fmt::Display for MesaSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MesaSelection::System => f.write_str("system"),
            MesaSelection::Latest => f.write_str("latest"),
            MesaSelection::Revision(rev) => f.write_str(rev),
        }
    }
}

/// One installed Mesa build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MesaBuild {
    /// Build directory
    pub dir: PathBuf,
    /// Revision encoded in the directory name
    pub revision: String,
}

impl MesaBuild {
    /// Library directory of the build
    pub fn lib_dir(&self) -> PathBuf {
        self.dir.join("lib")
    }

    /// DRI driver directory of the build
    pub fn dri_dir(&self) -> PathBuf {
        self.lib_dir().join("dri")
    }

    /// Environment that points the GL loader at this build
    pub fn env_vars(&self) -> BTreeMap<String, String> {
        let mut vars = BTreeMap::new();
        vars.insert(
            "LD_LIBRARY_PATH".to_string(),
            self.lib_dir().to_string_lossy().to_string(),
        );
        vars.insert(
            "LIBGL_DRIVERS_PATH".to_string(),
            self.dri_dir().to_string_lossy().to_string(),
        );
        vars
    }
}

/// Directory holding installed Mesa builds
#[derive(Debug, Clone)]
pub struct MesaInstall {
    root: PathBuf,
}

impl MesaInstall {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        MesaInstall { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Installed build names, sorted
    fn entries(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let name = entry?.file_name().to_string_lossy().to_string();
            if name.starts_with(BUILD_PREFIX) {
                names.push(name);
            }
        }
        names.sort();
        Ok(names)
    }

    fn build(&self, name: &str, revision: String) -> MesaBuild {
        MesaBuild {
            dir: self.root.join(name),
            revision,
        }
    }

    /// Build with the greatest numeric revision
    pub fn latest(&self) -> Result<MesaBuild> {
        let pattern = Regex::new(&format!(r"^{}(\d+)-", regex::escape(BUILD_PREFIX)))?;

        let latest = self
            .entries()?
            .into_iter()
            .filter_map(|name| {
                let number = pattern.captures(&name)?.get(1)?.as_str().parse::<u64>().ok()?;
                Some((number, name))
            })
            .max_by_key(|(number, _)| *number);

        match latest {
            Some((number, name)) => {
                debug!(build = %name, "latest mesa build");
                Ok(self.build(&name, number.to_string()))
            }
            None => Err(MesaError::NoBuilds(self.root.clone())),
        }
    }

    /// First build whose name starts with the revision
    pub fn find(&self, revision: &str) -> Result<MesaBuild> {
        let prefix = format!("{}{}", BUILD_PREFIX, revision);
        self.entries()?
            .into_iter()
            .find(|name| name.starts_with(&prefix))
            .map(|name| self.build(&name, revision.to_string()))
            .ok_or_else(|| MesaError::BuildNotFound(revision.to_string()))
    }

    /// Resolve a selection; `System` yields no build
    pub fn select(&self, selection: &MesaSelection) -> Result<Option<MesaBuild>> {
        let build = match selection {
            MesaSelection::System => {
                info!("Use system Mesa");
                return Ok(None);
            }
            MesaSelection::Latest => self.latest()?,
            MesaSelection::Revision(rev) => self.find(rev)?,
        };
        info!("Use mesa at {}", build.dir.display());
        Ok(Some(build))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn install_with(names: &[&str]) -> (tempfile::TempDir, MesaInstall) {
        let dir = tempdir().unwrap();
        for name in names {
            std::fs::create_dir(dir.path().join(name)).unwrap();
        }
        let install = MesaInstall::new(dir.path());
        (dir, install)
    }

    #[test]
    fn test_selection_parse() {
        assert_eq!(MesaSelection::parse("system"), MesaSelection::System);
        assert_eq!(MesaSelection::parse("latest"), MesaSelection::Latest);
        assert_eq!(
            MesaSelection::parse("98765"),
            MesaSelection::Revision("98765".to_string())
        );
        assert_eq!(MesaSelection::Latest.to_string(), "latest");
    }

    #[test]
    fn test_latest_uses_numeric_order() {
        let (_dir, install) = install_with(&[
            "mesa-master-release-99999-aaaa",
            "mesa-master-release-100001-bbbb",
            "unrelated",
        ]);
        let build = install.latest().unwrap();
        assert_eq!(build.revision, "100001");
        assert!(build.dir.ends_with("mesa-master-release-100001-bbbb"));
    }

    #[test]
    fn test_latest_without_builds() {
        let (_dir, install) = install_with(&["other"]);
        assert!(matches!(install.latest(), Err(MesaError::NoBuilds(_))));
    }

    #[test]
    fn test_find_by_revision() {
        let (_dir, install) = install_with(&["mesa-master-release-12345-cafe"]);
        let build = install.find("12345").unwrap();
        assert_eq!(build.revision, "12345");

        let err = install.find("54321").unwrap_err();
        assert_eq!(err.to_string(), "Could not find mesa build 54321");
    }

    #[test]
    fn test_select_system_has_no_build() {
        let install = MesaInstall::new("/nonexistent");
        assert!(install.select(&MesaSelection::System).unwrap().is_none());
    }

    #[test]
    fn test_env_vars() {
        let build = MesaBuild {
            dir: PathBuf::from("/workspace/install/mesa-master-release-1-x"),
            revision: "1".to_string(),
        };
        let vars = build.env_vars();
        assert_eq!(
            vars["LD_LIBRARY_PATH"],
            "/workspace/install/mesa-master-release-1-x/lib"
        );
        assert_eq!(
            vars["LIBGL_DRIVERS_PATH"],
            "/workspace/install/mesa-master-release-1-x/lib/dri"
        );
    }
}

//! Pipeline configuration.
//!
//! Everything the pipeline needs is resolved once into a [`PipelineConfig`]
//! and handed to [`crate::Pipeline`].

use anyhow::{bail, Context};
use mesa_env_manager::{MesaSelection, DEFAULT_INSTALL_DIR};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use webgl_ci_core::revision::lkgr::LKGR_SUCCESS_STREAK;
use webgl_ci_core::{is_chrome_package, HostOs};

/// Default Mesa source checkout driven by `mesa.py`.
pub const DEFAULT_MESA_SOURCE_DIR: &str = "/workspace/project/readonly/mesa";

/// Page opened by run-in-browser mode.
pub const DEFAULT_CONFORMANCE_URL: &str =
    "https://www.khronos.org/registry/webgl/sdk/tests/webgl-conformance-tests.html?version=2.0.1";

/// Directories below the workspace root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layout {
    pub root: PathBuf,
    /// Packaged builds (`<position>.zip`) and their unpacked trees.
    pub build_dir: PathBuf,
    pub chrome_src_dir: PathBuf,
    pub depot_tools_dir: PathBuf,
    pub script_dir: PathBuf,
    /// Result logs.
    pub result_dir: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let script_dir = root.join("script");
        Self {
            build_dir: root.join("build"),
            chrome_src_dir: root.join("chromium").join("src"),
            depot_tools_dir: root.join("depot_tools"),
            result_dir: script_dir.join("result"),
            script_dir,
            root,
        }
    }

    /// Proxy credentials file read by gsutil.
    pub fn boto_file(&self) -> PathBuf {
        self.script_dir.join(".boto")
    }

    pub fn chrome_package(&self, position: u64) -> PathBuf {
        self.build_dir.join(format!("{}.zip", position))
    }

    pub fn unpacked_chrome(&self, position: u64) -> PathBuf {
        self.build_dir.join(position.to_string())
    }
}

/// Which steps run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Modes {
    pub sync: bool,
    pub build: bool,
    pub test: bool,
    /// Launch the built browser on the conformance page instead of the harness.
    pub run: bool,
    /// Build then test, with Mesa and reporting on Linux.
    pub daily: bool,
}

/// Chromium revision to sync to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChromeTarget {
    Latest,
    /// Resolved from the build status page.
    LastKnownGood,
    Hash(String),
}

impl FromStr for ChromeTarget {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "latest" => Ok(ChromeTarget::Latest),
            "lkgr" => Ok(ChromeTarget::LastKnownGood),
            hash if !hash.is_empty() && hash.chars().all(|c| c.is_ascii_hexdigit()) => {
                Ok(ChromeTarget::Hash(hash.to_ascii_lowercase()))
            }
            other => bail!("invalid Chromium hash: {}", other),
        }
    }
}

/// Browser under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestChrome {
    /// A locally built and packaged Chromium.
    Build,
    Canary,
    Stable,
}

impl TestChrome {
    /// Resolve a `--test-chrome` value; `default` is canary on macOS, build elsewhere.
    pub fn resolve(value: &str, host: HostOs) -> anyhow::Result<Self> {
        match value {
            "default" if host == HostOs::Darwin => Ok(TestChrome::Canary),
            "default" | "build" => Ok(TestChrome::Build),
            "canary" => Ok(TestChrome::Canary),
            "stable" => Ok(TestChrome::Stable),
            other => bail!("test_chrome is not supported: {}", other),
        }
    }

    /// Value of `--browser=` for installed channels.
    pub fn channel(&self) -> &'static str {
        match self {
            TestChrome::Build => "exact",
            TestChrome::Canary => "canary",
            TestChrome::Stable => "stable",
        }
    }

    /// Install location of a release channel on this host.
    pub fn installed_path(&self, host: HostOs) -> anyhow::Result<PathBuf> {
        let path = match (host, self) {
            (HostOs::Darwin, TestChrome::Canary) => {
                "/Applications/Google Chrome Canary.app/Contents/MacOS/Google Chrome Canary"
            }
            (HostOs::Linux, TestChrome::Canary) => "/usr/bin/google-chrome-unstable",
            (HostOs::Linux, TestChrome::Stable) => "/usr/bin/google-chrome-stable",
            _ => bail!("test_chrome is not supported: {} on {}", self.channel(), host),
        };
        Ok(PathBuf::from(path))
    }
}

/// Packaged build to test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChromeSelection {
    Latest,
    Position(u64),
}

impl FromStr for ChromeSelection {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        if s == "latest" {
            return Ok(ChromeSelection::Latest);
        }
        if !is_chrome_package(&format!("{}.zip", s)) {
            bail!("invalid Chromium revision: {} (expected a commit position of 6+ digits)", s);
        }
        let position = s
            .parse::<u64>()
            .with_context(|| format!("invalid Chromium revision: {}", s))?;
        Ok(ChromeSelection::Position(position))
    }
}

/// HTTP proxy given as `host:port`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proxy {
    pub host: String,
    pub port: u16,
}

impl Proxy {
    /// gsutil configuration routing downloads through the proxy.
    pub fn boto_config(&self) -> String {
        format!(
            "[Boto]\nproxy={}\nproxy_port={}\nproxy_rdns=True",
            self.host, self.port
        )
    }
}

impl FromStr for Proxy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let Some((host, port)) = s.rsplit_once(':') else {
            bail!("proxy must be <host>:<port>, got {}", s);
        };
        if host.is_empty() {
            bail!("proxy host is empty: {}", s);
        }
        let port = port
            .parse::<u16>()
            .with_context(|| format!("invalid proxy port in {}", s))?;
        Ok(Proxy {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Daily report addressing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportConfig {
    pub from: String,
    pub to: Vec<String>,
}

impl ReportConfig {
    /// Parse a comma-separated recipient list.
    pub fn new(from: impl Into<String>, to: &str) -> Self {
        Self {
            from: from.into(),
            to: to
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        }
    }
}

/// Full configuration of one invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub host: HostOs,
    pub layout: Layout,
    pub modes: Modes,
    pub skip_sync: bool,
    pub proxy: Option<Proxy>,

    pub chrome_target: ChromeTarget,
    /// Build status page consulted for [`ChromeTarget::LastKnownGood`].
    pub lkgr_url: Option<String>,
    pub lkgr_streak: usize,

    pub test_chrome: TestChrome,
    pub chrome_rev: ChromeSelection,
    pub mesa: MesaSelection,
    pub mesa_install_dir: PathBuf,
    pub mesa_source_dir: PathBuf,
    /// Suite filter; `all` runs everything.
    pub test_filter: String,
    pub test_verbose: bool,
    pub conformance_url: String,

    /// Parallel jobs handed to gclient and ninja.
    pub jobs: usize,
    pub report: Option<ReportConfig>,
}

impl PipelineConfig {
    /// Defaults for a workspace rooted at `root`.
    pub fn new(host: HostOs, root: impl AsRef<Path>) -> Self {
        Self {
            host,
            layout: Layout::new(root.as_ref()),
            modes: Modes::default(),
            skip_sync: false,
            proxy: None,
            chrome_target: ChromeTarget::Latest,
            lkgr_url: None,
            lkgr_streak: LKGR_SUCCESS_STREAK,
            test_chrome: if host == HostOs::Darwin {
                TestChrome::Canary
            } else {
                TestChrome::Build
            },
            chrome_rev: ChromeSelection::Latest,
            mesa: MesaSelection::Latest,
            mesa_install_dir: PathBuf::from(DEFAULT_INSTALL_DIR),
            mesa_source_dir: PathBuf::from(DEFAULT_MESA_SOURCE_DIR),
            test_filter: "all".to_string(),
            test_verbose: false,
            conformance_url: DEFAULT_CONFORMANCE_URL.to_string(),
            jobs: default_jobs(),
            report: None,
        }
    }
}

/// Number of CPUs, at least 1.
pub fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

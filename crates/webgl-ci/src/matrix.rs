//! Conformance test matrix and harness command line.

use serde::Serialize;
use std::path::{Path, PathBuf};
use webgl_ci_core::{CommandSpec, HostOs};

/// Telemetry entry point, relative to a Chromium tree or unpacked bundle.
pub const HARNESS_SCRIPT: &str = "content/test/gpu/run_gpu_integration_test.py";

/// Flags used when opening the conformance page by hand.
pub const RUN_BROWSER_FLAGS: &[&str] = &[
    "--enable-experimental-web-platform-features",
    "--disable-gpu-process-for-dx12-vulkan-info-collection",
    "--disable-domain-blocking-for-3d-apis",
    "--disable-gpu-process-crash-limit",
    "--disable-blink-features=WebXR",
    "--js-flags=--expose-gc",
    "--disable-gpu-watchdog",
    "--autoplay-policy=no-user-gesture-required",
    "--disable-features=UseSurfaceLayerForVideo",
    "--enable-net-benchmarking",
    "--metrics-recording-only",
    "--no-default-browser-check",
    "--no-first-run",
    "--ignore-background-tasks",
    "--enable-gpu-benchmarking",
    "--deny-permission-prompts",
    "--disable-background-networking",
    "--disable-component-extensions-with-background-pages",
    "--disable-default-apps",
    "--disable-search-geolocation-disclosure",
    "--enable-crash-reporter-for-testing",
    "--disable-component-update",
];

/// Tests skipped per host.
pub fn skip_list(host: HostOs) -> &'static [&'static str] {
    match host {
        HostOs::Linux | HostOs::Windows | HostOs::Darwin => &[],
    }
}

/// One cell of the test matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TestConfiguration {
    /// `--webgl-conformance-version`
    pub webgl_version: &'static str,

    /// Direct3D backend (Windows only).
    pub d3d: Option<u8>,
}

/// Backend ANGLE picks when none is forced.
const DEFAULT_D3D: u8 = 11;

impl TestConfiguration {
    /// Configurations tested on a host.
    pub fn for_host(host: HostOs) -> Vec<TestConfiguration> {
        match host {
            HostOs::Linux | HostOs::Darwin => vec![TestConfiguration {
                webgl_version: "2.0.1",
                d3d: None,
            }],
            HostOs::Windows => vec![
                TestConfiguration {
                    webgl_version: "1.0.3",
                    d3d: Some(9),
                },
                TestConfiguration {
                    webgl_version: "1.0.3",
                    d3d: Some(11),
                },
                TestConfiguration {
                    webgl_version: "2.0.1",
                    d3d: Some(11),
                },
            ],
        }
    }

    /// `--extra-browser-args` forcing a non-default backend.
    pub fn extra_browser_args(&self) -> Option<String> {
        match self.d3d {
            Some(d3d) if d3d != DEFAULT_D3D => {
                Some(format!("--extra-browser-args=--use-angle=d3d{}", d3d))
            }
            _ => None,
        }
    }

    /// Result log name for this configuration.
    pub fn log_file_name(
        &self,
        host: HostOs,
        timestamp: &str,
        chrome_rev: &str,
        mesa_rev: Option<&str>,
    ) -> String {
        match host {
            HostOs::Linux => format!(
                "{}-{}-{}-{}.log",
                timestamp,
                chrome_rev,
                mesa_rev.unwrap_or("system"),
                self.webgl_version
            ),
            HostOs::Windows => format!(
                "{}-{}-{}-{}.log",
                timestamp,
                chrome_rev,
                self.webgl_version,
                self.d3d.unwrap_or(DEFAULT_D3D)
            ),
            HostOs::Darwin => format!("{}-{}-{}.log", timestamp, chrome_rev, self.webgl_version),
        }
    }
}

/// How the harness finds the browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserTarget {
    /// A specific binary (`--browser=exact --browser-executable=<path>`).
    Exact(PathBuf),
    /// An installed release channel (`--browser=<channel>`).
    Channel(String),
}

/// Harness invocation shared by all configurations of a run.
#[derive(Debug, Clone)]
pub struct TestCommand {
    pub browser: BrowserTarget,
    pub filter: String,
    pub skips: Vec<String>,
    pub verbose: bool,
}

impl TestCommand {
    pub fn new(browser: BrowserTarget, host: HostOs) -> Self {
        Self {
            browser,
            filter: "all".to_string(),
            skips: skip_list(host).iter().map(|s| s.to_string()).collect(),
            verbose: false,
        }
    }

    /// Command line for one configuration writing its results to `log_file`.
    pub fn command(&self, configuration: &TestConfiguration, log_file: &Path) -> CommandSpec {
        let mut spec =
            CommandSpec::new("python").args([HARNESS_SCRIPT, "webgl_conformance", "--disable-log-uploads"]);

        spec = match &self.browser {
            BrowserTarget::Exact(path) => spec
                .arg("--browser=exact")
                .arg(format!("--browser-executable={}", path.display())),
            BrowserTarget::Channel(channel) => spec.arg(format!("--browser={}", channel)),
        };

        if self.filter != "all" {
            spec = spec.arg(format!("--test-filter={}", self.filter));
        }
        for skip in &self.skips {
            spec = spec.arg(format!("--skip={}", skip));
        }
        if self.verbose {
            spec = spec.arg("--verbose");
        }

        spec = spec.arg(format!(
            "--webgl-conformance-version={}",
            configuration.webgl_version
        ));
        if let Some(extra) = configuration.extra_browser_args() {
            spec = spec.arg(extra);
        }
        spec.arg("--write-full-results-to")
            .arg(log_file.to_string_lossy())
    }
}

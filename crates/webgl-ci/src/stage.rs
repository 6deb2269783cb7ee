//! Build stage definitions.
//!
//! Each stage is one external tool invocation with a fixed working
//! directory and a fixed policy for non-zero exits.

use crate::config::PipelineConfig;
use std::path::PathBuf;
use webgl_ci_core::CommandSpec;

/// GN arguments of the release build that gets packaged.
pub const GN_ARGS: &str = "proprietary_codecs=true ffmpeg_branding=\"Chrome\" is_debug=false \
symbol_level=0 is_component_build=false enable_nacl=false";

/// Output directory of the Chromium build.
pub const OUT_DIR: &str = "out/Default";

/// Steps of syncing and building Chromium and Mesa.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStage {
    /// git pull in depot_tools
    DepotToolsPull,

    /// git pull in the Chromium checkout
    ChromiumPull,

    /// gclient sync -R --break_repo_locks --delete_unversioned_trees -j<N> [--revision=<hash>]
    GclientSync { jobs: usize, revision: Option<String> },

    /// git log --shortstat -1 (read-only)
    RevisionQuery,

    /// python lastchange.py -o LASTCHANGE
    LastChange,

    /// gn --args=<release args> gen out/Default
    GnGen,

    /// ninja -j<N> -C out/Default chrome chromedriver
    Ninja { jobs: usize },

    /// python tools/mb/mb.py zip out/Default/ telemetry_gpu_integration_test <zip>
    PackageTelemetry { archive: PathBuf },

    /// python mesa.py --sync
    MesaSync,

    /// python mesa.py --build
    MesaBuild,

    /// unzip <N>.zip -d <N>
    Unzip { archive: PathBuf, dest: PathBuf },
}

impl BuildStage {
    /// Get the stage name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            BuildStage::DepotToolsPull => "depot_tools_pull",
            BuildStage::ChromiumPull => "chromium_pull",
            BuildStage::GclientSync { .. } => "gclient_sync",
            BuildStage::RevisionQuery => "revision_query",
            BuildStage::LastChange => "lastchange",
            BuildStage::GnGen => "gn_gen",
            BuildStage::Ninja { .. } => "ninja",
            BuildStage::PackageTelemetry { .. } => "package_telemetry",
            BuildStage::MesaSync => "mesa_sync",
            BuildStage::MesaBuild => "mesa_build",
            BuildStage::Unzip { .. } => "unzip",
        }
    }

    /// Get the stage's command (without working directory).
    pub fn command(&self) -> CommandSpec {
        match self {
            BuildStage::DepotToolsPull | BuildStage::ChromiumPull => {
                CommandSpec::new("git").arg("pull")
            }
            BuildStage::GclientSync { jobs, revision } => {
                let spec = CommandSpec::new("gclient").args([
                    "sync".to_string(),
                    "-R".to_string(),
                    "--break_repo_locks".to_string(),
                    "--delete_unversioned_trees".to_string(),
                    format!("-j{}", jobs),
                ]);
                match revision {
                    Some(rev) => spec.arg(format!("--revision={}", rev)),
                    None => spec,
                }
            }
            BuildStage::RevisionQuery => CommandSpec::new("git")
                .args(["log", "--shortstat", "-1"])
                .captured()
                .read_only(),
            BuildStage::LastChange => {
                CommandSpec::new("python").args(["lastchange.py", "-o", "LASTCHANGE"])
            }
            BuildStage::GnGen => CommandSpec::new("gn")
                .arg(format!("--args={}", GN_ARGS))
                .args(["gen", OUT_DIR]),
            BuildStage::Ninja { jobs } => CommandSpec::new("ninja")
                .arg(format!("-j{}", jobs))
                .args(["-C", OUT_DIR, "chrome", "chromedriver"]),
            BuildStage::PackageTelemetry { archive } => CommandSpec::new("python")
                .args([
                    "tools/mb/mb.py",
                    "zip",
                    "out/Default/",
                    "telemetry_gpu_integration_test",
                ])
                .arg(archive.to_string_lossy()),
            BuildStage::MesaSync => CommandSpec::new("python").args(["mesa.py", "--sync"]),
            BuildStage::MesaBuild => CommandSpec::new("python").args(["mesa.py", "--build"]),
            BuildStage::Unzip { archive, dest } => CommandSpec::new("unzip")
                .arg(archive.to_string_lossy())
                .arg("-d")
                .arg(dest.to_string_lossy()),
        }
    }

    /// Directory the stage runs in.
    pub fn working_dir(&self, config: &PipelineConfig) -> PathBuf {
        let layout = &config.layout;
        match self {
            BuildStage::DepotToolsPull => layout.depot_tools_dir.clone(),
            BuildStage::LastChange => layout.chrome_src_dir.join("build").join("util"),
            BuildStage::MesaSync | BuildStage::MesaBuild => config.mesa_source_dir.clone(),
            BuildStage::Unzip { .. } => layout.build_dir.clone(),
            BuildStage::ChromiumPull
            | BuildStage::GclientSync { .. }
            | BuildStage::RevisionQuery
            | BuildStage::GnGen
            | BuildStage::Ninja { .. }
            | BuildStage::PackageTelemetry { .. } => layout.chrome_src_dir.clone(),
        }
    }

    /// Whether a non-zero exit aborts the pipeline.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BuildStage::RevisionQuery
                | BuildStage::GnGen
                | BuildStage::Ninja { .. }
                | BuildStage::PackageTelemetry { .. }
                | BuildStage::MesaBuild
                | BuildStage::Unzip { .. }
        )
    }

    /// Message reported when the stage exits non-zero.
    pub fn failure_message(&self) -> String {
        match self {
            BuildStage::RevisionQuery => "Failed to find the revision of Chromium".to_string(),
            BuildStage::GnGen => "Failed to execute gn command".to_string(),
            BuildStage::Ninja { .. } => "Failed to build Chromium".to_string(),
            BuildStage::PackageTelemetry { .. } => {
                "Failed to generate telemetry_gpu_integration_test".to_string()
            }
            BuildStage::MesaBuild => "Failed to build Mesa".to_string(),
            BuildStage::Unzip { archive, .. } => format!("Failed to unzip {}", archive.display()),
            other => format!("Stage {} failed", other.name()),
        }
    }

    /// Full command with working directory.
    pub fn spec(&self, config: &PipelineConfig) -> CommandSpec {
        self.command().cwd(self.working_dir(config))
    }
}

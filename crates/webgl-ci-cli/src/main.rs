//! WebGL CI - Chromium WebGL conformance automation
//!
//! The `webgl-ci` command drives one CI cycle on the local machine.
//!
//! ## Modes
//!
//! - `--sync`: update depot_tools and the Chromium checkout
//! - `--build`: build and package Chromium
//! - `--test`: run the WebGL conformance suite
//! - `--run`: open the conformance page in the built browser
//! - `--daily`: build Mesa and Chromium, test and mail the report

use anyhow::{Context, Result};
use clap::Parser;
use mesa_env_manager::MesaSelection;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, warn, Level};

use webgl_ci::config::default_jobs;
use webgl_ci::{
    ChromeSelection, ChromeTarget, Modes, Pipeline, PipelineConfig, Proxy, ReportConfig, TestChrome,
};
use webgl_ci_core::{
    init_tracing, CommandRunner, DryRunRunner, HostOs, ProcessRunner, SmtpMailer,
};

/// SMTP port of the local relay.
const SMTP_PORT: u16 = 25;

#[derive(Parser, Debug)]
#[command(name = "webgl-ci")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Chromium WebGL conformance CI", long_about = None)]
struct Cli {
    /// HTTP proxy for downloads, as <host>:<port>
    #[arg(long, env = "WEBGL_CI_PROXY")]
    proxy: Option<String>,

    /// Sync depot_tools and the Chromium checkout
    #[arg(long)]
    sync: bool,

    /// Build Chromium
    #[arg(long)]
    build: bool,

    /// Chromium revision to build: latest, lkgr or a commit hash
    #[arg(long, default_value = "latest")]
    build_chrome_hash: String,

    /// Build status page consulted for `lkgr`
    #[arg(long, env = "WEBGL_CI_LKGR_URL")]
    lkgr_url: Option<String>,

    /// Run the conformance tests
    #[arg(long)]
    test: bool,

    /// Packaged Chromium to test: latest or a commit position
    #[arg(long, default_value = "latest")]
    test_chrome_rev: String,

    /// Mesa to test against: latest, system or a revision
    #[arg(long, default_value = "latest")]
    test_mesa_rev: String,

    /// Test suite filter
    #[arg(long, default_value = "all")]
    test_filter: String,

    /// Verbose harness output
    #[arg(long)]
    test_verbose: bool,

    /// Browser to test: default, build, canary or stable
    #[arg(long, default_value = "default")]
    test_chrome: String,

    /// Daily cycle: build, test and report
    #[arg(long)]
    daily: bool,

    /// Open the conformance page in the built browser
    #[arg(long)]
    run: bool,

    /// Log commands without running them
    #[arg(long)]
    dryrun: bool,

    /// Do not sync before building
    #[arg(long)]
    skip_sync: bool,

    /// Workspace root (default: parent of the binary's directory)
    #[arg(long, env = "WEBGL_CI_ROOT_DIR")]
    root_dir: Option<PathBuf>,

    /// Directory of installed Mesa builds
    #[arg(long, env = "WEBGL_CI_MESA_INSTALL_DIR", default_value = mesa_env_manager::DEFAULT_INSTALL_DIR)]
    mesa_install_dir: PathBuf,

    /// Mesa source checkout
    #[arg(long, env = "WEBGL_CI_MESA_SOURCE_DIR", default_value = webgl_ci::config::DEFAULT_MESA_SOURCE_DIR)]
    mesa_source_dir: PathBuf,

    /// Report recipients, comma separated
    #[arg(long, env = "WEBGL_CI_REPORT_TO")]
    report_to: Option<String>,

    /// Report sender
    #[arg(long, env = "WEBGL_CI_REPORT_FROM", default_value = "webgl-ci@localhost")]
    report_from: String,

    /// SMTP relay host
    #[arg(long, env = "WEBGL_CI_SMTP_HOST", default_value = "localhost")]
    smtp_host: String,

    /// Page opened by --run
    #[arg(long, default_value = webgl_ci::config::DEFAULT_CONFORMANCE_URL)]
    conformance_url: String,

    /// Parallel build jobs (default: number of CPUs)
    #[arg(long)]
    jobs: Option<usize>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,
}

impl Cli {
    /// Resolve the arguments into a pipeline configuration for `host`.
    fn into_config(self, host: HostOs) -> Result<PipelineConfig> {
        let root = match self.root_dir {
            Some(root) => root,
            None => default_root_dir()?,
        };

        let mut config = PipelineConfig::new(host, root);
        config.modes = Modes {
            sync: self.sync,
            build: self.build,
            test: self.test,
            run: self.run,
            daily: self.daily,
        };
        config.skip_sync = self.skip_sync;
        config.proxy = self
            .proxy
            .as_deref()
            .map(str::parse::<Proxy>)
            .transpose()
            .context("Invalid --proxy")?;
        config.chrome_target = self
            .build_chrome_hash
            .parse::<ChromeTarget>()
            .context("Invalid --build-chrome-hash")?;
        config.lkgr_url = self.lkgr_url;
        config.test_chrome = TestChrome::resolve(&self.test_chrome, host)?;
        config.chrome_rev = self
            .test_chrome_rev
            .parse::<ChromeSelection>()
            .context("Invalid --test-chrome-rev")?;
        config.mesa = MesaSelection::parse(&self.test_mesa_rev);
        config.mesa_install_dir = self.mesa_install_dir;
        config.mesa_source_dir = self.mesa_source_dir;
        config.test_filter = self.test_filter;
        config.test_verbose = self.test_verbose;
        config.conformance_url = self.conformance_url;
        config.jobs = self.jobs.unwrap_or_else(default_jobs).max(1);
        config.report = self
            .report_to
            .map(|to| ReportConfig::new(self.report_from, &to));
        Ok(config)
    }
}

/// Parent of the directory holding the binary, or the current directory.
fn default_root_dir() -> Result<PathBuf> {
    let exe_parent = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().and_then(|dir| dir.parent()).map(PathBuf::from));
    match exe_parent {
        Some(root) => Ok(root),
        None => std::env::current_dir().context("Failed to determine the workspace root"),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let dry_run = cli.dryrun;
    let smtp_host = cli.smtp_host.clone();
    let config = cli.into_config(HostOs::current())?;

    let runner: Arc<dyn CommandRunner> = if dry_run {
        Arc::new(DryRunRunner::new(ProcessRunner))
    } else {
        Arc::new(ProcessRunner)
    };
    let mailer = Arc::new(SmtpMailer::new(smtp_host, SMTP_PORT));

    let outcome = Pipeline::new(config, runner, mailer).execute().await?;
    if outcome.failed_runs() > 0 {
        warn!(
            failed = outcome.failed_runs(),
            "Some conformance runs reported failures"
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    if let Err(e) = run(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

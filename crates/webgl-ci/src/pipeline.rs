//! Pipeline orchestration: sync, build, test, run-in-browser and daily report.

use crate::config::{ChromeSelection, ChromeTarget, PipelineConfig, Proxy, TestChrome};
use crate::matrix::{BrowserTarget, TestCommand, TestConfiguration, RUN_BROWSER_FLAGS};
use crate::stage::BuildStage;
use anyhow::{bail, Context, Result};
use mesa_env_manager::MesaInstall;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use webgl_ci_core::{
    fetch_build_page, last_known_good, latest_chrome_package, parse_build_rows, parse_git_log,
    regression_count, render_subject, render_summary, ChromiumRevision, Classification,
    CommandOutput, CommandRunner, CommandSpec, EmailReport, HostOs, ReportMailer, ResultLog,
};

/// Result of one matrix configuration.
#[derive(Debug, Clone)]
pub struct TestRunRecord {
    pub configuration: TestConfiguration,

    /// Where the harness was asked to write its results.
    pub log_file: PathBuf,

    /// Harness exit code (0 = all tests as expected).
    pub exit_code: i32,

    /// Present when the run was classified for a report.
    pub classification: Option<Classification>,

    /// Present when a report was mailed.
    pub report: Option<EmailReport>,
}

impl TestRunRecord {
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }
}

/// What a pipeline invocation did.
#[derive(Debug, Clone, Default)]
pub struct PipelineOutcome {
    /// Hash Chromium was synced to (`None` = tip of tree).
    pub sync_target: Option<String>,

    /// Revision of the checkout that was built or found packaged.
    pub built_revision: Option<ChromiumRevision>,

    /// Commit position or channel that was tested.
    pub tested_chrome: Option<String>,

    /// Mesa revision tested against (`system` for the system driver).
    pub mesa_revision: Option<String>,

    /// Run-in-browser mode opened the conformance page.
    pub browser_launched: bool,

    pub runs: Vec<TestRunRecord>,
}

impl PipelineOutcome {
    /// Number of harness invocations that exited non-zero.
    pub fn failed_runs(&self) -> usize {
        self.runs.iter().filter(|r| !r.passed()).count()
    }
}

/// WebGL conformance pipeline.
///
/// Holds the configuration and the environment overrides that every
/// external command receives; steps run strictly one after another.
pub struct Pipeline {
    config: PipelineConfig,
    runner: Arc<dyn CommandRunner>,
    mailer: Arc<dyn ReportMailer>,
    env: BTreeMap<String, String>,
    current_dir: Option<PathBuf>,
    synced: bool,
    outcome: PipelineOutcome,
}

impl Pipeline {
    /// Create a pipeline with depot_tools prepended to `PATH`.
    pub fn new(
        config: PipelineConfig,
        runner: Arc<dyn CommandRunner>,
        mailer: Arc<dyn ReportMailer>,
    ) -> Self {
        let depot_tools = config.layout.depot_tools_dir.to_string_lossy().to_string();
        let path = match std::env::var("PATH") {
            Ok(path) if !path.is_empty() => {
                format!("{}{}{}", depot_tools, config.host.path_separator(), path)
            }
            _ => depot_tools,
        };

        let mut env = BTreeMap::new();
        env.insert("PATH".to_string(), path);

        Self {
            config,
            runner,
            mailer,
            env,
            current_dir: None,
            synced: false,
            outcome: PipelineOutcome::default(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Environment overrides attached to every command.
    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Run every selected step.
    ///
    /// Daily mode implies build and test; run mode implies test.
    pub async fn execute(mut self) -> Result<PipelineOutcome> {
        let modes = self.config.modes;
        info!(host = %self.config.host, ?modes, "Starting WebGL CI pipeline");

        if modes.sync {
            self.sync().await?;
        }
        if modes.build || modes.daily {
            self.build().await?;
        }
        if modes.test || modes.run || modes.daily {
            self.test().await?;
        }

        info!(
            runs = self.outcome.runs.len(),
            failed = self.outcome.failed_runs(),
            "WebGL CI pipeline finished"
        );
        Ok(self.outcome)
    }

    async fn exec(&mut self, spec: CommandSpec) -> Result<CommandOutput> {
        let spec = spec.envs(&self.env);
        if let Some(dir) = &spec.cwd {
            if self.current_dir.as_deref() != Some(dir.as_path()) {
                info!("Enter {}", dir.display());
                self.current_dir = Some(dir.clone());
            }
        }
        if !spec.read_only {
            info!(cmd = %spec.display(), "Run command");
        }

        let output = self.runner.run(&spec).await?;
        if output.duration_ms > 0 {
            debug!(duration_ms = output.duration_ms, "{} finished", spec.program);
        }
        Ok(output)
    }

    async fn run_stage(&mut self, stage: BuildStage) -> Result<CommandOutput> {
        let output = self.exec(stage.spec(&self.config)).await?;
        if !output.success() {
            if stage.is_fatal() {
                bail!("{} (exit code {})", stage.failure_message(), output.exit_code);
            }
            warn!(
                stage = stage.name(),
                exit_code = output.exit_code,
                "{}",
                stage.failure_message()
            );
        }
        Ok(output)
    }

    async fn current_revision(&mut self) -> Result<ChromiumRevision> {
        let output = self.run_stage(BuildStage::RevisionQuery).await?;
        let revision =
            parse_git_log(&output.stdout).context("Failed to find the revision of Chromium")?;
        debug!(revision = %revision, "current Chromium revision");
        Ok(revision)
    }

    /// Hash to sync to, `None` for tip of tree.
    async fn resolve_target(&self) -> Result<Option<String>> {
        match &self.config.chrome_target {
            ChromeTarget::Latest => Ok(None),
            ChromeTarget::Hash(hash) => Ok(Some(hash.clone())),
            ChromeTarget::LastKnownGood => {
                let url = self
                    .config
                    .lkgr_url
                    .as_deref()
                    .context("--lkgr-url is required to sync to the last known good revision")?;
                let page = fetch_build_page(url).await?;
                let rows = parse_build_rows(&page)?;
                let hash = last_known_good(&rows, self.config.lkgr_streak)
                    .with_context(|| format!("No last known good revision on {}", url))?;
                Ok(Some(hash))
            }
        }
    }

    /// Update depot_tools and move the Chromium checkout to the target revision.
    async fn sync(&mut self) -> Result<()> {
        if self.synced {
            return Ok(());
        }
        self.synced = true;

        self.run_stage(BuildStage::DepotToolsPull).await?;

        let target = self.resolve_target().await?;
        self.outcome.sync_target = target.clone();

        if let Some(hash) = &target {
            let current = self.current_revision().await?;
            if current.hash.starts_with(hash.as_str()) {
                info!(hash = %hash, "Chromium is already at the requested revision");
                return Ok(());
            }
        }

        self.run_stage(BuildStage::ChromiumPull).await?;
        self.run_stage(BuildStage::GclientSync {
            jobs: self.config.jobs,
            revision: target,
        })
        .await?;
        Ok(())
    }

    async fn build(&mut self) -> Result<()> {
        if self.config.modes.daily && self.config.host == HostOs::Linux {
            if !self.config.skip_sync {
                self.run_stage(BuildStage::MesaSync).await?;
            }
            self.run_stage(BuildStage::MesaBuild).await?;
        }

        if !self.config.skip_sync {
            self.sync().await?;
        }
        if self.config.test_chrome == TestChrome::Build {
            self.build_chrome().await?;
        }
        Ok(())
    }

    /// Build Chromium and package the telemetry bundle as `<position>.zip`.
    async fn build_chrome(&mut self) -> Result<()> {
        let revision = self.current_revision().await?;
        let archive = self.config.layout.chrome_package(revision.commit_position);
        self.outcome.built_revision = Some(revision.clone());

        if archive.exists() {
            info!(archive = %archive.display(), "Chrome has been built");
            return Ok(());
        }

        self.env
            .insert("DEPOT_TOOLS_WIN_TOOLCHAIN".to_string(), "0".to_string());
        if let Some(proxy) = self.config.proxy.clone() {
            self.configure_proxy(&proxy)?;
        }

        let jobs = self.config.jobs;
        self.run_stage(BuildStage::LastChange).await?;
        self.run_stage(BuildStage::GnGen).await?;
        self.run_stage(BuildStage::Ninja { jobs }).await?;

        std::fs::create_dir_all(&self.config.layout.build_dir).with_context(|| {
            format!("Failed to create {}", self.config.layout.build_dir.display())
        })?;
        self.run_stage(BuildStage::PackageTelemetry {
            archive: archive.clone(),
        })
        .await?;

        info!(revision = %revision, archive = %archive.display(), "Chromium build packaged");
        Ok(())
    }

    /// Route downloads through the proxy, including gsutil via a fresh `.boto`.
    fn configure_proxy(&mut self, proxy: &Proxy) -> Result<()> {
        self.env
            .insert("http_proxy".to_string(), proxy.to_string());
        self.env
            .insert("https_proxy".to_string(), proxy.to_string());

        let boto = self.config.layout.boto_file();
        std::fs::create_dir_all(&self.config.layout.script_dir)
            .with_context(|| format!("Failed to create {}", self.config.layout.script_dir.display()))?;
        if boto.exists() {
            std::fs::remove_file(&boto)
                .with_context(|| format!("Failed to remove {}", boto.display()))?;
        }
        std::fs::write(&boto, proxy.boto_config())
            .with_context(|| format!("Failed to write {}", boto.display()))?;

        self.env.insert(
            "NO_AUTH_BOTO_CONFIG".to_string(),
            boto.to_string_lossy().to_string(),
        );
        Ok(())
    }

    /// Point the GL loader at the selected Mesa build.
    fn select_mesa(&mut self) -> Result<String> {
        let install = MesaInstall::new(&self.config.mesa_install_dir);
        match install.select(&self.config.mesa)? {
            Some(build) => {
                self.env.extend(build.env_vars());
                Ok(build.revision)
            }
            None => Ok("system".to_string()),
        }
    }

    fn select_chrome_package(&self) -> Result<u64> {
        match self.config.chrome_rev {
            ChromeSelection::Position(position) => Ok(position),
            ChromeSelection::Latest => {
                let latest = latest_chrome_package(&self.config.layout.build_dir)
                    .context("Could not find the correct revision")?;
                Ok(latest.number)
            }
        }
    }

    /// Unpack `<position>.zip` next to the archive unless already unpacked.
    ///
    /// A tree without the browser binary (left by a dry run or an
    /// interrupted unzip) is discarded and unpacked again.
    async fn unpack_chrome(&mut self, position: u64) -> Result<PathBuf> {
        let unpacked = self.config.layout.unpacked_chrome(position);
        if unpacked.join(self.config.host.chrome_binary()).is_file() {
            return Ok(unpacked);
        }

        let archive = self.config.layout.chrome_package(position);
        if !archive.exists() {
            bail!("Could not find Chromium revision {}", position);
        }
        if unpacked.exists() {
            warn!(dir = %unpacked.display(), "Removing incomplete Chromium tree");
            std::fs::remove_dir_all(&unpacked)
                .with_context(|| format!("Failed to remove {}", unpacked.display()))?;
        }
        std::fs::create_dir_all(&unpacked)
            .with_context(|| format!("Failed to create {}", unpacked.display()))?;

        let stage = BuildStage::Unzip {
            archive,
            dest: unpacked.clone(),
        };
        let output = self.exec(stage.spec(&self.config)).await?;
        if !output.success() {
            std::fs::remove_dir_all(&unpacked).ok();
            bail!("{} (exit code {})", stage.failure_message(), output.exit_code);
        }
        Ok(unpacked)
    }

    async fn launch_browser(&mut self, unpacked: &Path, chrome: &Path) -> Result<()> {
        let binary = unpacked.join(chrome);
        let spec = CommandSpec::new(binary.to_string_lossy())
            .args(RUN_BROWSER_FLAGS.iter().copied())
            .arg(self.config.conformance_url.clone())
            .cwd(unpacked);

        let output = self.exec(spec).await?;
        if !output.success() {
            warn!(exit_code = output.exit_code, "Browser exited with an error");
        }
        self.outcome.browser_launched = true;
        Ok(())
    }

    /// Run the conformance matrix (or open the browser in run mode).
    async fn test(&mut self) -> Result<()> {
        let host = self.config.host;

        let mesa_rev = if host == HostOs::Linux {
            Some(self.select_mesa()?)
        } else {
            None
        };
        self.outcome.mesa_revision = mesa_rev.clone();

        let (browser, chrome_rev, work_dir) = match self.config.test_chrome {
            TestChrome::Build => {
                let position = self.select_chrome_package()?;
                let unpacked = self.unpack_chrome(position).await?;
                let chrome = PathBuf::from(host.chrome_binary());
                self.outcome.tested_chrome = Some(position.to_string());

                if self.config.modes.run {
                    return self.launch_browser(&unpacked, &chrome).await;
                }
                (BrowserTarget::Exact(chrome), position.to_string(), unpacked)
            }
            channel => {
                let installed = channel.installed_path(host)?;
                debug!(browser = %installed.display(), "testing installed browser");
                let name = channel.channel().to_string();
                self.outcome.tested_chrome = Some(name.clone());
                (
                    BrowserTarget::Channel(name.clone()),
                    name,
                    self.config.layout.chrome_src_dir.clone(),
                )
            }
        };

        let mut command = TestCommand::new(browser, host);
        command.filter = self.config.test_filter.clone();
        command.verbose = self.config.test_verbose;

        let result_dir = self.config.layout.result_dir.clone();
        std::fs::create_dir_all(&result_dir)
            .with_context(|| format!("Failed to create {}", result_dir.display()))?;
        let timestamp = chrono::Local::now().format("%Y%m%d%H%M%S").to_string();
        let reporting = self.config.modes.daily && host == HostOs::Linux;

        for configuration in TestConfiguration::for_host(host) {
            let log_file = result_dir.join(configuration.log_file_name(
                host,
                &timestamp,
                &chrome_rev,
                mesa_rev.as_deref(),
            ));
            let spec = command.command(&configuration, &log_file).cwd(&work_dir);
            let line = spec.display();

            let output = self.exec(spec).await?;
            if !output.success() {
                warn!("Failed to run test \"{}\"", line);
            }

            let mut record = TestRunRecord {
                configuration,
                log_file,
                exit_code: output.exit_code,
                classification: None,
                report: None,
            };
            if reporting {
                let mesa = mesa_rev.as_deref().unwrap_or("system");
                self.report(&mut record, &chrome_rev, mesa).await?;
            }
            self.outcome.runs.push(record);
        }
        Ok(())
    }

    /// Classify a run's results and mail the summary.
    ///
    /// An unreadable result log only produces a warning.
    async fn report(
        &self,
        record: &mut TestRunRecord,
        chrome_rev: &str,
        mesa_rev: &str,
    ) -> Result<()> {
        let classified = ResultLog::load(&record.log_file)
            .and_then(|log| log.classify().map(|c| (log, c)));
        let (log, classification) = match classified {
            Ok(pair) => pair,
            Err(e) => {
                warn!(
                    log = %record.log_file.display(),
                    error = %e,
                    "Failed to read test results"
                );
                return Ok(());
            }
        };

        let subject = render_subject(
            chrome_rev,
            mesa_rev,
            regression_count(&log, &classification),
        );
        let body = render_summary(&log, &classification);
        info!(
            total = classification.total(),
            regressions = classification.regressions().len(),
            "Classified test results"
        );

        match &self.config.report {
            Some(report) if !report.to.is_empty() => {
                let email = EmailReport {
                    from: report.from.clone(),
                    to: report.to.clone(),
                    subject,
                    body,
                };
                self.mailer
                    .send(&email)
                    .await
                    .context("Failed to send report")?;
                record.report = Some(email);
            }
            _ => info!(subject = %subject, "No report recipients configured\n{}", body),
        }

        record.classification = Some(classification);
        Ok(())
    }
}

//! WebGL CI Core Library
//!
//! Building blocks shared by the pipeline and the CLI:
//! - a command runner abstraction over external tools (with a dry-run wrapper)
//! - Chromium revision parsing and last-known-good resolution
//! - discovery of packaged builds on disk
//! - classification of conformance result logs and report rendering
//! - delivery of reports through a local mail relay

pub mod artifacts;
pub mod error;
pub mod exec;
pub mod fakes;
pub mod host;
pub mod mail;
pub mod report;
pub mod results;
pub mod revision;
pub mod telemetry;

pub use artifacts::{is_chrome_package, latest_chrome_package, latest_numbered, NumberedArtifact};
pub use error::{Result, WebglCiError};
pub use exec::{CommandOutput, CommandRunner, CommandSpec, DryRunRunner, ProcessRunner};
pub use host::HostOs;
pub use mail::{EmailReport, ReportMailer, SmtpMailer};
pub use report::{regression_count, render_subject, render_summary};
pub use results::{classify, Classification, Outcome, ResultLog, TestResult};
pub use revision::lkgr::{fetch_build_page, last_known_good, parse_build_rows, BuildRow};
pub use revision::{parse_git_log, ChromiumRevision};
pub use telemetry::init_tracing;

/// WebGL CI version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

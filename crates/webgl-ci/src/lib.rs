//! WebGL CI - Chromium graphics conformance automation
//!
//! Provides a pipeline that:
//! - Syncs and builds a Chromium revision and packages the test bundle
//! - Selects a Mesa driver build to test against
//! - Runs the WebGL conformance suite over a per-host configuration matrix
//! - Classifies the results and mails a daily report

pub mod config;
pub mod matrix;
pub mod pipeline;
pub mod stage;

// Re-export key types
pub use config::{
    ChromeSelection, ChromeTarget, Layout, Modes, PipelineConfig, Proxy, ReportConfig, TestChrome,
};
pub use matrix::{BrowserTarget, TestCommand, TestConfiguration};
pub use pipeline::{Pipeline, PipelineOutcome, TestRunRecord};
pub use stage::BuildStage;

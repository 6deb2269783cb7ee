//! In-memory fakes for the runner and mailer traits (testing only)
//!
//! `RecordingRunner` records every command and answers from a scripted
//! prefix table; `RecordingMailer` keeps sent reports in memory.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{Result, WebglCiError};
use crate::exec::{CommandOutput, CommandRunner, CommandSpec};
use crate::mail::{EmailReport, ReportMailer};

// ---------------------------------------------------------------------------
// RecordingRunner
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct RunnerState {
    responses: Vec<(String, CommandOutput)>,
    specs: Vec<CommandSpec>,
}

/// Scripted command runner.
///
/// Responses are matched by prefix against [`CommandSpec::display`]; the
/// most recently registered match wins. Unmatched commands succeed with
/// empty output. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct RecordingRunner {
    state: Arc<Mutex<RunnerState>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands starting with `prefix` with `output`.
    pub fn respond(&self, prefix: &str, output: CommandOutput) {
        let mut state = self.state.lock().unwrap();
        state.responses.push((prefix.to_string(), output));
    }

    /// Rendered command lines in execution order.
    pub fn commands(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.specs.iter().map(CommandSpec::display).collect()
    }

    /// Full specs in execution order.
    pub fn specs(&self) -> Vec<CommandSpec> {
        self.state.lock().unwrap().specs.clone()
    }

    /// Specs whose command line starts with `prefix`.
    pub fn find(&self, prefix: &str) -> Vec<CommandSpec> {
        let state = self.state.lock().unwrap();
        state
            .specs
            .iter()
            .filter(|s| s.display().starts_with(prefix))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let mut state = self.state.lock().unwrap();
        state.specs.push(spec.clone());
        let line = spec.display();
        let output = state
            .responses
            .iter()
            .rev()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, out)| out.clone())
            .unwrap_or_default();
        Ok(output)
    }
}

// ---------------------------------------------------------------------------
// RecordingMailer
// ---------------------------------------------------------------------------

/// Mailer that keeps every report in memory.
#[derive(Debug, Clone, Default)]
pub struct RecordingMailer {
    sent: Arc<Mutex<Vec<EmailReport>>>,
    fail: bool,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A mailer whose relay always rejects the message.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<EmailReport> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ReportMailer for RecordingMailer {
    async fn send(&self, report: &EmailReport) -> Result<()> {
        if self.fail {
            return Err(WebglCiError::Mail("relay rejected message".to_string()));
        }
        self.sent.lock().unwrap().push(report.clone());
        Ok(())
    }
}

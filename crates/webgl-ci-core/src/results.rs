//! Conformance result logs and their classification.
//!
//! The test harness writes a JSON document whose `tests` member is a tree of
//! suite path segments; every object carrying an `expected` field is one
//! test. Each test is sorted into one of four buckets by crossing its
//! expected and actual outcome.

use crate::error::{Result, WebglCiError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

fn default_delimiter() -> String {
    "/".to_string()
}

/// Result document written by `--write-full-results-to`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResultLog {
    #[serde(default)]
    pub version: Option<u32>,

    #[serde(default)]
    pub interrupted: bool,

    /// Separator used to join suite path segments into a test name.
    #[serde(default = "default_delimiter")]
    pub path_delimiter: String,

    /// Aggregate counts keyed by outcome (`PASS`, `FAIL`, `SKIP`, ...).
    #[serde(default)]
    pub num_failures_by_type: BTreeMap<String, u64>,

    #[serde(default)]
    pub num_regressions: Option<u64>,

    /// Nested test tree.
    pub tests: Value,
}

impl ResultLog {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Aggregate count for an outcome, 0 when absent.
    pub fn count(&self, outcome: &str) -> u64 {
        self.num_failures_by_type
            .get(outcome)
            .copied()
            .unwrap_or(0)
    }

    pub fn classify(&self) -> Result<Classification> {
        classify(&self.tests, &self.path_delimiter)
    }
}

/// Pass/fail view of a reported outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Pass,
    Fail,
}

impl Outcome {
    /// `PASS` is a pass, anything else (FAIL, SKIP, CRASH, TIMEOUT) is not.
    ///
    /// Space-separated lists record retries; the final entry decides.
    pub fn from_report(outcome: &str) -> Self {
        match outcome.split_whitespace().last() {
            Some("PASS") => Outcome::Pass,
            _ => Outcome::Fail,
        }
    }
}

/// A single test leaf.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    /// Suite path joined with the log's delimiter.
    pub name: String,
    pub expected: String,
    pub actual: String,
}

/// Every test of a log, sorted into four buckets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub expected_fail_actual_fail: Vec<TestResult>,
    pub expected_fail_actual_pass: Vec<TestResult>,
    pub expected_pass_actual_fail: Vec<TestResult>,
    pub expected_pass_actual_pass: Vec<TestResult>,
}

impl Classification {
    pub fn bucket(&self, expected: Outcome, actual: Outcome) -> &[TestResult] {
        match (expected, actual) {
            (Outcome::Fail, Outcome::Fail) => &self.expected_fail_actual_fail,
            (Outcome::Fail, Outcome::Pass) => &self.expected_fail_actual_pass,
            (Outcome::Pass, Outcome::Fail) => &self.expected_pass_actual_fail,
            (Outcome::Pass, Outcome::Pass) => &self.expected_pass_actual_pass,
        }
    }

    fn bucket_mut(&mut self, expected: Outcome, actual: Outcome) -> &mut Vec<TestResult> {
        match (expected, actual) {
            (Outcome::Fail, Outcome::Fail) => &mut self.expected_fail_actual_fail,
            (Outcome::Fail, Outcome::Pass) => &mut self.expected_fail_actual_pass,
            (Outcome::Pass, Outcome::Fail) => &mut self.expected_pass_actual_fail,
            (Outcome::Pass, Outcome::Pass) => &mut self.expected_pass_actual_pass,
        }
    }

    /// Tests that were expected to pass but failed.
    pub fn regressions(&self) -> &[TestResult] {
        &self.expected_pass_actual_fail
    }

    pub fn total(&self) -> usize {
        self.expected_fail_actual_fail.len()
            + self.expected_fail_actual_pass.len()
            + self.expected_pass_actual_fail.len()
            + self.expected_pass_actual_pass.len()
    }
}

/// Classify every leaf of a result tree.
///
/// Leaves are visited depth-first in key order.
pub fn classify(tests: &Value, delimiter: &str) -> Result<Classification> {
    let root = tests
        .as_object()
        .ok_or_else(|| WebglCiError::InvalidResultLog("`tests` is not an object".to_string()))?;

    let mut classification = Classification::default();
    let mut path = Vec::new();
    walk(root, &mut path, delimiter, &mut classification)?;
    Ok(classification)
}

fn walk<'a>(
    node: &'a Map<String, Value>,
    path: &mut Vec<&'a str>,
    delimiter: &str,
    out: &mut Classification,
) -> Result<()> {
    for (key, value) in node {
        let Some(child) = value.as_object() else {
            continue;
        };
        path.push(key);

        if let Some(expected) = child.get("expected") {
            let name = path.join(delimiter);
            let expected = expected.as_str().ok_or_else(|| {
                WebglCiError::InvalidResultLog(format!("{name}: `expected` is not a string"))
            })?;
            let actual = child
                .get("actual")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    WebglCiError::InvalidResultLog(format!("{name}: missing `actual` outcome"))
                })?;

            out.bucket_mut(Outcome::from_report(expected), Outcome::from_report(actual))
                .push(TestResult {
                    name,
                    expected: expected.to_string(),
                    actual: actual.to_string(),
                });
        } else {
            walk(child, path, delimiter, out)?;
        }

        path.pop();
    }
    Ok(())
}

//! Plain-text rendering of conformance run reports.

use crate::results::{Classification, Outcome, ResultLog, TestResult};

/// Section titles in the order they appear in the body.
const SECTIONS: [(Outcome, Outcome, &str); 4] = [
    (Outcome::Pass, Outcome::Fail, "EXPECTED PASS, ACTUAL FAIL"),
    (Outcome::Fail, Outcome::Pass, "EXPECTED FAIL, ACTUAL PASS"),
    (Outcome::Fail, Outcome::Fail, "EXPECTED FAIL, ACTUAL FAIL"),
    (Outcome::Pass, Outcome::Pass, "EXPECTED PASS, ACTUAL PASS"),
];

/// Render the report body.
///
/// The first line repeats the harness' aggregate counts, followed by the
/// bucket counts and one name list per non-empty bucket.
pub fn render_summary(log: &ResultLog, classification: &Classification) -> String {
    let mut out = format!(
        "FAIL: {}, SKIP: {}, PASS {}\n",
        log.count("FAIL"),
        log.count("SKIP"),
        log.count("PASS")
    );

    out.push('\n');
    for (expected, actual, title) in SECTIONS {
        out.push_str(&format!(
            "{}: {}\n",
            title,
            classification.bucket(expected, actual).len()
        ));
    }
    out.push_str(&format!("TOTAL: {}\n", classification.total()));

    for (expected, actual, title) in SECTIONS {
        let tests = classification.bucket(expected, actual);
        if tests.is_empty() {
            continue;
        }
        out.push_str(&format!("\n[{}]\n", title));
        for test in tests {
            push_test(&mut out, test);
        }
    }

    out
}

fn push_test(out: &mut String, test: &TestResult) {
    out.push_str(&test.name);
    out.push('\n');
}

/// Number of regressions reported for a run.
///
/// The harness' own count wins when present.
pub fn regression_count(log: &ResultLog, classification: &Classification) -> u64 {
    log.num_regressions
        .unwrap_or(classification.regressions().len() as u64)
}

pub fn render_subject(chrome_rev: &str, mesa_rev: &str, regressions: u64) -> String {
    format!(
        "WebGL CTS on Chrome {} and Mesa {} has {} Regression",
        chrome_rev, mesa_rev, regressions
    )
}

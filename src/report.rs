//! Per-test records accumulated as the pipeline runs.
//!
//! A `TestReport` is created by discovery, carried through every stage, and
//! read by the stats pass. Each executed command leaves a `StepResult` behind
//! so failures can be reconstructed from the report alone.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Pipeline stage that produced a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StageKind {
    Compile,
    Pgo,
    Aot,
    Run,
}

impl StageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Compile => "compile",
            StageKind::Pgo => "pgo",
            StageKind::Aot => "aot",
            StageKind::Run => "run",
        }
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a child process ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitKind {
    /// Normal termination with an exit code
    Code(i32),

    /// Killed by a signal (unix)
    Signaled(i32),

    /// Killed by the harness after the per-test timeout
    TimedOut,
}

impl std::fmt::Display for ExitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitKind::Code(code) => write!(f, "exit code {}", code),
            ExitKind::Signaled(sig) => write!(f, "signal {}", sig),
            ExitKind::TimedOut => write!(f, "timed out"),
        }
    }
}

/// One executed command for one stage of one test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// Stage that ran the command
    pub stage: StageKind,

    /// Whether the stage's success policy accepted the outcome
    pub passed: bool,

    /// Full argv of the command
    pub command: Vec<String>,

    /// How the child ended
    pub exit: ExitKind,

    /// Captured standard output
    pub stdout: String,

    /// Captured standard error
    pub stderr: String,

    /// Wall-clock duration of the command
    pub duration: Duration,

    /// Verdict annotation (expectation diff, signal description)
    pub message: Option<String>,

    /// Stage-generated content worth keeping (e.g. a files-info manifest)
    pub extra: Option<String>,
}

/// Everything known about one test case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestReport {
    /// Absolute path of the test source inside the corpus
    pub source_path: PathBuf,

    /// Stable identifier: corpus-relative path, always `/`-separated
    pub test_id: String,

    /// Directory holding this test's artifacts (.abc/.ap/.an, manifests)
    pub out_dir: PathBuf,

    /// Current pass/fail state; stages only ever flip this to false
    pub passed: bool,

    /// Listed in the ignore list: a failure is not a new failure
    pub ignored: bool,

    /// Steps in execution order
    pub steps: Vec<StepResult>,
}

impl TestReport {
    pub fn new(source_path: PathBuf, test_id: String, out_dir: PathBuf) -> Self {
        Self {
            source_path,
            test_id,
            out_dir,
            passed: true,
            ignored: false,
            steps: Vec::new(),
        }
    }

    /// Append a step and fold its outcome into the overall state
    pub fn push_step(&mut self, step: StepResult) {
        if !step.passed {
            self.passed = false;
        }
        self.steps.push(step);
    }

    /// Stage of the first failed step, if any
    pub fn failing_stage(&self) -> Option<StageKind> {
        self.steps.iter().find(|s| !s.passed).map(|s| s.stage)
    }

    /// Multi-line description of the first failure, for result.txt and JUnit
    pub fn describe_failure(&self) -> String {
        let Some(step) = self.steps.iter().find(|s| !s.passed) else {
            return String::new();
        };
        let mut out = String::new();
        out.push_str(&format!("stage: {}\n", step.stage));
        out.push_str(&format!("command: {}\n", step.command.join(" ")));
        out.push_str(&format!("exit: {}\n", step.exit));
        if let Some(message) = &step.message {
            out.push_str(&format!("message: {}\n", message));
        }
        if !step.stdout.is_empty() {
            out.push_str(&format!("stdout:\n{}\n", step.stdout));
        }
        if !step.stderr.is_empty() {
            out.push_str(&format!("stderr:\n{}\n", step.stderr));
        }
        out
    }

    /// Total wall-clock time spent in this test's steps
    pub fn total_duration(&self) -> Duration {
        self.steps.iter().map(|s| s.duration).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(stage: StageKind, passed: bool) -> StepResult {
        StepResult {
            stage,
            passed,
            command: vec!["tool".to_string(), "arg".to_string()],
            exit: ExitKind::Code(if passed { 0 } else { 1 }),
            stdout: String::new(),
            stderr: String::new(),
            duration: Duration::from_millis(5),
            message: None,
            extra: None,
        }
    }

    #[test]
    fn test_push_step_folds_failure() {
        let mut report = TestReport::new(
            PathBuf::from("/corpus/regresstest/a.js"),
            "regresstest/a.js".to_string(),
            PathBuf::from("/out/a"),
        );
        assert!(report.passed);

        report.push_step(step(StageKind::Compile, true));
        assert!(report.passed);

        report.push_step(step(StageKind::Run, false));
        assert!(!report.passed);
        assert_eq!(report.failing_stage(), Some(StageKind::Run));
    }

    #[test]
    fn test_failure_stays_failed() {
        let mut report = TestReport::new(
            PathBuf::from("/corpus/regresstest/b.js"),
            "regresstest/b.js".to_string(),
            PathBuf::from("/out/b"),
        );
        report.push_step(step(StageKind::Compile, false));
        report.push_step(step(StageKind::Run, true));
        assert!(!report.passed);
        assert_eq!(report.failing_stage(), Some(StageKind::Compile));
    }

    #[test]
    fn test_describe_failure_includes_command() {
        let mut report = TestReport::new(
            PathBuf::from("/corpus/regresstest/c.js"),
            "regresstest/c.js".to_string(),
            PathBuf::from("/out/c"),
        );
        let mut failed = step(StageKind::Run, false);
        failed.message = Some("Segmentation fault (core dumped)".to_string());
        report.push_step(failed);

        let text = report.describe_failure();
        assert!(text.contains("stage: run"));
        assert!(text.contains("command: tool arg"));
        assert!(text.contains("Segmentation fault (core dumped)"));
    }

    #[test]
    fn test_describe_failure_empty_when_passed() {
        let report = TestReport::new(
            PathBuf::from("/corpus/regresstest/d.js"),
            "regresstest/d.js".to_string(),
            PathBuf::from("/out/d"),
        );
        assert_eq!(report.describe_failure(), "");
    }
}

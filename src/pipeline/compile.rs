//! Compile stage: test source to `.abc` bytecode via the frontend compiler.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::RunnerConfig;
use crate::exec::{CommandSpec, SPAWN_FAILURE_CODE, run_command};
use crate::pipeline::Stage;
use crate::pipeline::prepare::helper_paths;
use crate::report::{ExitKind, StageKind, StepResult, TestReport};
use crate::verdict::{self, SuccessPolicy};

/// Module kind recorded for every files-info line
pub const MODULE_KIND: &str = "esm";

/// Name of the per-test source manifest handed to the frontend
pub const FILES_INFO_NAME: &str = "files_info.txt";

pub fn artifact_stem(report: &TestReport) -> String {
    report
        .source_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Bytecode artifact produced by this stage
pub fn abc_path(report: &TestReport) -> PathBuf {
    report.out_dir.join(format!("{}.abc", artifact_stem(report)))
}

/// Where a sibling `.out` expectation is copied for the run stage
pub fn expect_copy_path(report: &TestReport) -> PathBuf {
    report.out_dir.join(format!("{}.out", artifact_stem(report)))
}

pub fn files_info_path(report: &TestReport) -> PathBuf {
    report.out_dir.join(FILES_INFO_NAME)
}

pub struct CompileStage {
    config: Arc<RunnerConfig>,
}

impl CompileStage {
    pub fn new(config: Arc<RunnerConfig>) -> Self {
        Self { config }
    }

    /// Three manifest lines: the two helper scripts, then the test source
    fn files_info_content(&self, report: &TestReport) -> String {
        let [env_helper, tool_helper] = helper_paths(&self.config.corpus_dir());
        let mut content = String::new();
        for path in [&env_helper, &tool_helper, &report.source_path] {
            content.push_str(&format!("{};{}\n", path.display(), MODULE_KIND));
        }
        content
    }

    fn build_argv(&self, report: &TestReport) -> Vec<String> {
        vec![
            self.config.ark_frontend_binary.to_string_lossy().into_owned(),
            "--module".to_string(),
            format!("--output={}", abc_path(report).display()),
            format!("@{}", files_info_path(report).display()),
        ]
    }
}

/// Failed step recorded when a stage hits a filesystem problem instead of a
/// tool failure
fn io_failure_step(stage: StageKind, command: Vec<String>, err: &std::io::Error) -> StepResult {
    StepResult {
        stage,
        passed: false,
        command,
        exit: ExitKind::Code(SPAWN_FAILURE_CODE),
        stdout: String::new(),
        stderr: String::new(),
        duration: std::time::Duration::ZERO,
        message: Some(err.to_string()),
        extra: None,
    }
}

#[async_trait]
impl Stage for CompileStage {
    fn kind(&self) -> StageKind {
        StageKind::Compile
    }

    async fn process(&self, mut report: TestReport) -> TestReport {
        let argv = self.build_argv(&report);
        let files_info = self.files_info_content(&report);

        if let Err(err) = std::fs::create_dir_all(&report.out_dir)
            .and_then(|()| std::fs::write(files_info_path(&report), &files_info))
        {
            report.push_step(io_failure_step(StageKind::Compile, argv, &err));
            return report;
        }

        let mut spec = CommandSpec::new(argv.clone(), self.config.timeout);
        spec.env = self.config.base_env();
        let outcome = run_command(&spec).await;

        let verdict = verdict::evaluate(
            &SuccessPolicy::ExitCodeOnly,
            &outcome,
            &report.source_path,
            &report.test_id,
            &self.config.corpus_dir(),
        );

        report.push_step(StepResult {
            stage: StageKind::Compile,
            passed: verdict.passed,
            command: argv.clone(),
            exit: outcome.exit,
            stdout: outcome.stdout,
            stderr: outcome.stderr,
            duration: outcome.duration,
            message: verdict.message,
            extra: Some(files_info),
        });

        if report.passed {
            let sibling = report.source_path.with_extension("out");
            if sibling.is_file() {
                if let Err(err) = std::fs::copy(&sibling, expect_copy_path(&report)) {
                    report.push_step(io_failure_step(StageKind::Compile, argv, &err));
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testutil::{echo_config, seeded_report};

    #[tokio::test]
    async fn test_compile_writes_manifest_and_passes() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let config = Arc::new(echo_config(dir.path(), &out));
        let report = seeded_report(dir.path(), &out);

        let stage = CompileStage::new(Arc::clone(&config));
        let report = stage.process(report).await;

        assert!(report.passed);
        assert_eq!(report.steps.len(), 1);
        let step = &report.steps[0];
        assert_eq!(step.stage, StageKind::Compile);

        let manifest = std::fs::read_to_string(files_info_path(&report)).unwrap();
        let lines: Vec<&str> = manifest.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("regress_test_env.js;esm"));
        assert!(lines[1].ends_with("regress_test_tool.js;esm"));
        assert!(lines[2].ends_with("case.js;esm"));
        assert_eq!(step.extra.as_deref(), Some(manifest.as_str()));
    }

    #[tokio::test]
    async fn test_compile_copies_expectation() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let config = Arc::new(echo_config(dir.path(), &out));
        let report = seeded_report(dir.path(), &out);
        std::fs::write(report.source_path.with_extension("out"), "expected\n").unwrap();

        let stage = CompileStage::new(config);
        let report = stage.process(report).await;

        assert!(report.passed);
        let copied = std::fs::read_to_string(expect_copy_path(&report)).unwrap();
        assert_eq!(copied, "expected\n");
    }

    #[tokio::test]
    async fn test_compile_failure_marks_report() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let mut config = echo_config(dir.path(), &out);
        config.ark_frontend_binary = PathBuf::from("/bin/false");
        let report = seeded_report(dir.path(), &out);

        let stage = CompileStage::new(Arc::new(config));
        let report = stage.process(report).await;

        assert!(!report.passed);
        assert_eq!(report.failing_stage(), Some(StageKind::Compile));
    }

    #[test]
    fn test_argv_shape() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let config = Arc::new(echo_config(dir.path(), &out));
        let report = seeded_report(dir.path(), &out);

        let stage = CompileStage::new(config);
        let argv = stage.build_argv(&report);
        assert_eq!(argv[0], "/bin/echo");
        assert_eq!(argv[1], "--module");
        assert!(argv[2].starts_with("--output="));
        assert!(argv[2].ends_with("case.abc"));
        assert!(argv[3].starts_with('@'));
        assert!(argv[3].ends_with(FILES_INFO_NAME));
    }
}

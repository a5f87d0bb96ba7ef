//! PGO stage: interpreter run with the profiler enabled, producing an `.ap`
//! profile the AOT compiler consumes.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::RunnerConfig;
use crate::exec::{CommandSpec, run_command};
use crate::pipeline::Stage;
use crate::pipeline::compile::{abc_path, artifact_stem};
use crate::report::{StageKind, StepResult, TestReport};
use crate::verdict::{self, SuccessPolicy};

/// Profile artifact produced by this stage
pub fn profile_path(report: &TestReport) -> PathBuf {
    report.out_dir.join(format!("{}.ap", artifact_stem(report)))
}

pub struct PgoStage {
    config: Arc<RunnerConfig>,
}

impl PgoStage {
    pub fn new(config: Arc<RunnerConfig>) -> Self {
        Self { config }
    }

    fn build_argv(&self, report: &TestReport) -> Vec<String> {
        let mut argv = self.config.qemu_prefix();
        argv.push(self.config.ark_tool.to_string_lossy().into_owned());
        argv.push("--enable-pgo-profiler=true".to_string());
        argv.push(format!(
            "--compiler-pgo-profiler-path={}",
            profile_path(report).display()
        ));
        if let Some(icu) = &self.config.icu_path {
            argv.push(format!("--icu-data-path={}", icu.display()));
        }
        argv.push(format!("--entry-point={}", artifact_stem(report)));
        argv.push(abc_path(report).to_string_lossy().into_owned());
        argv
    }
}

#[async_trait]
impl Stage for PgoStage {
    fn kind(&self) -> StageKind {
        StageKind::Pgo
    }

    async fn process(&self, mut report: TestReport) -> TestReport {
        let argv = self.build_argv(&report);
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
            stage: StageKind::Pgo,
            passed: verdict.passed,
            command: argv,
            exit: outcome.exit,
            stdout: outcome.stdout,
            stderr: outcome.stderr,
            duration: outcome.duration,
            message: verdict.message,
            extra: None,
        });
        report
    }
}

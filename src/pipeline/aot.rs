//! AOT stage: ahead-of-time compilation of the `.abc` bytecode with a fixed
//! optimization flag set, optionally guided by the PGO profile.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::RunnerConfig;
use crate::exec::{CommandSpec, run_command};
use crate::pipeline::Stage;
use crate::pipeline::compile::{abc_path, artifact_stem};
use crate::pipeline::pgo::profile_path;
use crate::report::{StageKind, StepResult, TestReport};
use crate::verdict::{self, SuccessPolicy};

/// Native artifact produced by this stage, handed to the interpreter later
pub fn aot_file_path(report: &TestReport) -> PathBuf {
    report.out_dir.join(format!("{}.an", artifact_stem(report)))
}

pub struct AotStage {
    config: Arc<RunnerConfig>,
}

impl AotStage {
    pub fn new(config: Arc<RunnerConfig>) -> Self {
        Self { config }
    }

    fn build_argv(&self, report: &TestReport) -> Vec<String> {
        let mut argv = self.config.qemu_prefix();
        let aot_tool = self
            .config
            .ark_aot_tool
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        argv.push(aot_tool);
        argv.push("--compiler-opt-inlining=true".to_string());
        argv.push("--compiler-opt-loop-peeling=true".to_string());
        if self.config.enable_litecg {
            argv.push("--compiler-enable-litecg=true".to_string());
        }
        if self.config.run_pgo {
            argv.push(format!(
                "--compiler-pgo-profiler-path={}",
                profile_path(report).display()
            ));
        }
        argv.push(format!("--aot-file={}", aot_file_path(report).display()));
        argv.push(abc_path(report).to_string_lossy().into_owned());
        argv
    }
}

#[async_trait]
impl Stage for AotStage {
    fn kind(&self) -> StageKind {
        StageKind::Aot
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
            stage: StageKind::Aot,
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

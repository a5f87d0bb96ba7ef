//! Run stage: execute the compiled test in the interpreter and judge the
//! outcome against its expectation file or the stderr assertion.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::RunnerConfig;
use crate::exec::{CommandSpec, run_command};
use crate::lists::{GROUP_ELEMENTS_KIND, GROUP_NO_FORCE_GC, RegressGroups, parse_env_comment};
use crate::pipeline::Stage;
use crate::pipeline::aot::aot_file_path;
use crate::pipeline::compile::{abc_path, artifact_stem, expect_copy_path};
use crate::report::{StageKind, StepResult, TestReport};
use crate::verdict::{self, SuccessPolicy};

pub struct RunStage {
    config: Arc<RunnerConfig>,
    groups: Arc<RegressGroups>,
}

impl RunStage {
    pub fn new(config: Arc<RunnerConfig>, groups: Arc<RegressGroups>) -> Self {
        Self { config, groups }
    }

    fn build_argv(&self, report: &TestReport) -> Vec<String> {
        let mut argv = self.config.qemu_prefix();
        argv.push(self.config.ark_tool.to_string_lossy().into_owned());
        if let Some(icu) = &self.config.icu_path {
            argv.push(format!("--icu-data-path={}", icu.display()));
        }
        if self.config.disable_force_gc
            || self.groups.contains(GROUP_NO_FORCE_GC, &report.test_id)
        {
            argv.push("--enable-force-gc=false".to_string());
        }
        if self.groups.contains(GROUP_ELEMENTS_KIND, &report.test_id) {
            argv.push("--enable-elements-kind=true".to_string());
        }
        argv.push(format!("--entry-point={}", artifact_stem(report)));
        if self.config.ark_aot {
            argv.push(format!("--aot-file={}", aot_file_path(report).display()));
        }
        argv.push(abc_path(report).to_string_lossy().into_owned());
        argv
    }

    fn pick_policy(&self, report: &TestReport) -> SuccessPolicy {
        let expect_path = expect_copy_path(report);
        if expect_path.is_file() {
            SuccessPolicy::ExpectFileMatch { expect_path }
        } else {
            SuccessPolicy::AssertStderr
        }
    }
}

#[async_trait]
impl Stage for RunStage {
    fn kind(&self) -> StageKind {
        StageKind::Run
    }

    async fn process(&self, mut report: TestReport) -> TestReport {
        let argv = self.build_argv(&report);

        let mut spec = CommandSpec::new(argv.clone(), self.config.timeout);
        spec.env = self.config.base_env();
        // locale tests pin TZ/LC_ALL through an in-source comment
        if let Ok(source) = std::fs::read_to_string(&report.source_path) {
            spec.env.extend(parse_env_comment(&source));
        }

        let outcome = run_command(&spec).await;

        let policy = self.pick_policy(&report);
        let verdict = verdict::evaluate(
            &policy,
            &outcome,
            &report.source_path,
            &report.test_id,
            &self.config.corpus_dir(),
        );

        report.push_step(StepResult {
            stage: StageKind::Run,
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

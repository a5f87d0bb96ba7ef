//! Stage abstraction and the bounded parallel driver.
//!
//! A stage is a per-report transformation: it receives a `TestReport`, runs
//! whatever external command it needs, appends a `StepResult` and returns the
//! report. The driver fans one stage out over all reports with a bounded
//! number of concurrent workers, collecting results in completion order
//! (ordering is not meaningful, only the aggregate is).
//!
//! Reports that already failed skip every later stage untouched.

pub mod aot;
pub mod compile;
pub mod pgo;
pub mod prepare;
pub mod run;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::report::{StageKind, TestReport};

/// One pipeline stage, applied independently to each report
#[async_trait]
pub trait Stage: Send + Sync {
    /// Stage identity, used for logging and the failing-stage tally
    fn kind(&self) -> StageKind;

    /// Process one report, appending a step for the executed command
    async fn process(&self, report: TestReport) -> TestReport;
}

/// Fan one stage out over all reports with at most `processes` concurrent
/// workers. Already-failed reports pass through without running the stage.
pub async fn run_stage(
    stage: Arc<dyn Stage>,
    reports: Vec<TestReport>,
    processes: usize,
) -> Vec<TestReport> {
    let semaphore = Arc::new(Semaphore::new(processes));
    let mut tasks = JoinSet::new();
    let mut done = Vec::with_capacity(reports.len());

    for report in reports {
        if !report.passed {
            done.push(report);
            continue;
        }
        let stage = Arc::clone(&stage);
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return report,
            };
            stage.process(report).await
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(report) => done.push(report),
            Err(err) => tracing::error!(error = %err, "stage worker panicked"),
        }
    }
    done
}

/// Run stages in order, each one fanned out over the full report list
pub async fn run_pipeline(
    stages: &[Arc<dyn Stage>],
    mut reports: Vec<TestReport>,
    processes: usize,
) -> Vec<TestReport> {
    for stage in stages {
        let pending = reports.iter().filter(|r| r.passed).count();
        tracing::info!(stage = %stage.kind(), pending, total = reports.len(), "stage start");
        reports = run_stage(Arc::clone(stage), reports, processes).await;
        let failed = reports.iter().filter(|r| !r.passed).count();
        tracing::info!(stage = %stage.kind(), failed, "stage done");
    }
    reports
}

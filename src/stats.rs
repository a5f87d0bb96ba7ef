//! Result aggregation: pass/fail log, JUnit XML, failing-stage tally and the
//! new-failures computation that drives the process exit code.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use chrono::Utc;
use serde::Serialize;

use crate::error::RegressResult;
use crate::report::TestReport;

/// Plain pass/fail log, rotated on every run
pub const RESULT_FILE: &str = "result.txt";

/// Previous run's log, kept as a backup
pub const RESULT_BACKUP_FILE: &str = "result_last.log";

/// JUnit report consumed by CI
pub const JUNIT_FILE: &str = "report.xml";

/// Structured log sink for the run
pub const LOG_FILE: &str = "test.log";

/// Aggregate outcome of one harness run
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub ignored_failures: usize,

    /// Failed tests per stage name
    pub stage_tally: BTreeMap<String, usize>,

    /// Failed, non-ignored test ids; `None` when no ignore list was supplied
    pub new_failures: Option<Vec<String>>,
}

impl RunSummary {
    /// Count feeding the process exit code; absent ignore list means zero
    pub fn new_failure_count(&self) -> usize {
        self.new_failures.as_ref().map_or(0, Vec::len)
    }

    pub fn print(&self) {
        println!("Total tests:      {}", self.total);
        println!("Passed:           {}", self.passed);
        println!("Failed:           {}", self.failed);
        println!("Ignored failures: {}", self.ignored_failures);
        if !self.stage_tally.is_empty() {
            println!("Failures by stage:");
            for (stage, count) in &self.stage_tally {
                println!("  {}: {}", stage, count);
            }
        }
        match &self.new_failures {
            Some(ids) if ids.is_empty() => println!("New failures:     0"),
            Some(ids) => {
                println!("New failures:     {}", ids.len());
                for id in ids {
                    println!("  {}", id);
                }
            }
            None => println!("New failures:     0 (no ignore list supplied)"),
        }
    }
}

/// Fold the final report list into a summary.
///
/// `ignore_supplied` distinguishes an empty ignore list from no list at all:
/// without a list the new-failures set is undefined and reported as zero.
pub fn summarize(reports: &[TestReport], ignore_supplied: bool) -> RunSummary {
    let failed: Vec<&TestReport> = reports.iter().filter(|r| !r.passed).collect();
    let ignored_failures = failed.iter().filter(|r| r.ignored).count();

    let mut stage_tally = BTreeMap::new();
    for report in &failed {
        if let Some(stage) = report.failing_stage() {
            *stage_tally.entry(stage.as_str().to_string()).or_insert(0) += 1;
        }
    }

    let new_failures = if ignore_supplied {
        let mut ids: Vec<String> = failed
            .iter()
            .filter(|r| !r.ignored)
            .map(|r| r.test_id.clone())
            .collect();
        ids.sort();
        Some(ids)
    } else {
        None
    };

    RunSummary {
        total: reports.len(),
        passed: reports.len() - failed.len(),
        failed: failed.len(),
        ignored_failures,
        stage_tally,
        new_failures,
    }
}

/// Write the line-oriented result log, rotating any previous one to
/// `result_last.log` first.
pub fn write_result_log(result_dir: &Path, reports: &[TestReport]) -> RegressResult<()> {
    std::fs::create_dir_all(result_dir)?;
    let result_path = result_dir.join(RESULT_FILE);
    if result_path.exists() {
        std::fs::rename(&result_path, result_dir.join(RESULT_BACKUP_FILE))?;
    }

    let mut ordered: Vec<&TestReport> = reports.iter().collect();
    ordered.sort_by(|a, b| a.test_id.cmp(&b.test_id));

    let mut file = std::fs::File::create(&result_path)?;
    for report in ordered {
        if report.passed {
            writeln!(file, "PASS: {}", report.test_id)?;
        } else {
            writeln!(file, "FAIL: {}", report.test_id)?;
            for line in report.describe_failure().lines() {
                writeln!(file, "    {}", line)?;
            }
        }
    }
    Ok(())
}

/// Emit the JUnit document: one `<testsuite>` with a `<testcase>` per
/// report, `<failure>` for counting failures and `<skipped/>` for ignored
/// ones.
pub fn write_junit(result_dir: &Path, reports: &[TestReport]) -> RegressResult<()> {
    std::fs::create_dir_all(result_dir)?;

    let failures = reports.iter().filter(|r| !r.passed && !r.ignored).count();
    let skipped = reports.iter().filter(|r| !r.passed && r.ignored).count();
    let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S");

    let mut doc = String::new();
    doc.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    doc.push_str(&format!(
        "<testsuite name=\"ark-regress\" tests=\"{}\" failures=\"{}\" skipped=\"{}\" timestamp=\"{}\">\n",
        reports.len(),
        failures,
        skipped,
        timestamp
    ));

    let mut ordered: Vec<&TestReport> = reports.iter().collect();
    ordered.sort_by(|a, b| a.test_id.cmp(&b.test_id));

    for report in ordered {
        let name = xml_escape(&report.test_id);
        let time = report.total_duration().as_secs_f64();
        if report.passed {
            doc.push_str(&format!(
                "  <testcase name=\"{}\" time=\"{:.3}\"/>\n",
                name, time
            ));
        } else if report.ignored {
            doc.push_str(&format!(
                "  <testcase name=\"{}\" time=\"{:.3}\">\n    <skipped/>\n  </testcase>\n",
                name, time
            ));
        } else {
            let message = report
                .failing_stage()
                .map(|stage| format!("{} stage failed", stage))
                .unwrap_or_else(|| "failed".to_string());
            doc.push_str(&format!(
                "  <testcase name=\"{}\" time=\"{:.3}\">\n    <failure message=\"{}\">{}</failure>\n  </testcase>\n",
                name,
                time,
                xml_escape(&message),
                xml_escape(&report.describe_failure())
            ));
        }
    }
    doc.push_str("</testsuite>\n");

    std::fs::write(result_dir.join(JUNIT_FILE), doc)?;
    Ok(())
}

fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

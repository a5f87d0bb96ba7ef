//! Corpus preparation and test discovery.
//!
//! Runs once before the per-test stages: makes sure the regression corpus is
//! checked out at the pinned commit, materializes the shared test-tool helper
//! scripts, and turns the surviving test files into the initial `TestReport`
//! list. Every failure here is fatal; a missing or corrupt corpus would
//! invalidate every downstream result.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{CLONE_RETRIES, RunnerConfig};
use crate::error::{RegressError, RegressResult};
use crate::exec::{CommandSpec, run_command};
use crate::report::{ExitKind, TestReport};
use crate::verdict::CORPUS_DIR_NAME;

/// Directory inside the corpus holding the materialized helper scripts
pub const HELPER_DIR: &str = "test_tools";

/// Generous ceiling for git operations; clones of the corpus are large
const GIT_TIMEOUT: Duration = Duration::from_secs(1800);

/// Runtime shims every test can rely on
const HELPER_ENV_NAME: &str = "regress_test_env.js";
const HELPER_ENV_SOURCE: &str = r#"// Shims for host functions the regression corpus assumes.
if (typeof print === "undefined") {
    var print = function (msg) {
        console.log(msg);
    };
}
if (typeof gc === "undefined") {
    var gc = function () {};
}
"#;

/// Assertion helpers the corpus calls
const HELPER_TOOL_NAME: &str = "regress_test_tool.js";
const HELPER_TOOL_SOURCE: &str = r#"function fail(message) {
    print("FAILED: " + message);
    throw new Error(message);
}

function assertTrue(condition, message) {
    if (!condition) {
        fail(message || "expected true");
    }
}

function assertFalse(condition, message) {
    assertTrue(!condition, message || "expected false");
}

function assertEquals(expected, actual, message) {
    if (expected !== actual) {
        fail((message || "") + " expected <" + expected + "> but was <" + actual + ">");
    }
}

function assertThrows(fn, message) {
    var threw = false;
    try {
        fn();
    } catch (e) {
        threw = true;
    }
    assertTrue(threw, message || "expected an exception");
}
"#;

/// Absolute paths of the helper scripts, in files-info manifest order
pub fn helper_paths(corpus_dir: &Path) -> [PathBuf; 2] {
    [
        corpus_dir.join(HELPER_DIR).join(HELPER_ENV_NAME),
        corpus_dir.join(HELPER_DIR).join(HELPER_TOOL_NAME),
    ]
}

/// Ensure the corpus checkout exists at the pinned commit and the helper
/// scripts are in place.
pub async fn prepare_corpus(config: &RunnerConfig) -> RegressResult<()> {
    let corpus_dir = config.corpus_dir();

    if config.force_clone && corpus_dir.exists() {
        tracing::info!(dir = %corpus_dir.display(), "removing corpus for re-clone");
        std::fs::remove_dir_all(&corpus_dir)?;
    }

    if corpus_dir.join(".git").is_dir() {
        tracing::info!(dir = %corpus_dir.display(), "reusing existing corpus checkout");
    } else {
        clone_corpus(config, &corpus_dir).await?;
        checkout_commit(config, &corpus_dir).await?;
    }

    materialize_helpers(&corpus_dir)?;
    Ok(())
}

async fn clone_corpus(config: &RunnerConfig, corpus_dir: &Path) -> RegressResult<()> {
    let url = config.repo_url();
    std::fs::create_dir_all(&config.test_root)?;

    let mut last_failure = String::new();
    for attempt in 1..=CLONE_RETRIES {
        tracing::info!(%url, attempt, "cloning corpus");
        let spec = CommandSpec::new(
            vec![
                "git".to_string(),
                "clone".to_string(),
                url.clone(),
                corpus_dir.to_string_lossy().into_owned(),
            ],
            GIT_TIMEOUT,
        );
        let outcome = run_command(&spec).await;
        if outcome.exit == ExitKind::Code(0) {
            return Ok(());
        }

        last_failure = format!("{}: {}", outcome.exit, outcome.stderr.trim());
        tracing::warn!(attempt, failure = %last_failure, "clone attempt failed");
        if corpus_dir.exists() {
            std::fs::remove_dir_all(corpus_dir)?;
        }
    }

    Err(RegressError::Repo(format!(
        "git clone failed after {} attempts: {}",
        CLONE_RETRIES, last_failure
    )))
}

async fn checkout_commit(config: &RunnerConfig, corpus_dir: &Path) -> RegressResult<()> {
    let commit = config.repo_commit();
    tracing::info!(%commit, "checking out pinned commit");
    let spec = CommandSpec::new(
        vec![
            "git".to_string(),
            "-C".to_string(),
            corpus_dir.to_string_lossy().into_owned(),
            "checkout".to_string(),
            commit.clone(),
        ],
        GIT_TIMEOUT,
    );
    let outcome = run_command(&spec).await;
    if outcome.exit != ExitKind::Code(0) {
        return Err(RegressError::Repo(format!(
            "git checkout {} failed: {}",
            commit,
            outcome.stderr.trim()
        )));
    }
    Ok(())
}

fn materialize_helpers(corpus_dir: &Path) -> RegressResult<()> {
    let helper_dir = corpus_dir.join(HELPER_DIR);
    std::fs::create_dir_all(&helper_dir)?;
    std::fs::write(helper_dir.join(HELPER_ENV_NAME), HELPER_ENV_SOURCE)?;
    std::fs::write(helper_dir.join(HELPER_TOOL_NAME), HELPER_TOOL_SOURCE)?;
    Ok(())
}

/// Build the initial report list from the prepared corpus.
///
/// `skip` removes tests entirely; `ignore` pre-marks reports whose failure
/// will not count as a new failure.
pub fn discover_tests(
    config: &RunnerConfig,
    skip: &HashSet<String>,
    ignore: &HashSet<String>,
    test_list: Option<&[String]>,
) -> RegressResult<Vec<TestReport>> {
    let corpus_dir = config.corpus_dir();

    let mut reports = if let Some(test_file) = &config.test_file {
        let source = corpus_dir.join(test_file);
        if !source.is_file() {
            return Err(RegressError::Config(format!(
                "--test-file not found in corpus: {}",
                source.display()
            )));
        }
        vec![report_for(config, &corpus_dir, source)?]
    } else if let Some(ids) = test_list {
        let mut selected = Vec::with_capacity(ids.len());
        for id in ids {
            let rel = id
                .strip_prefix(CORPUS_DIR_NAME)
                .map(|rest| rest.trim_start_matches('/'))
                .unwrap_or(id);
            let source = corpus_dir.join(rel);
            if !source.is_file() {
                return Err(RegressError::Config(format!(
                    "test list entry not found in corpus: {}",
                    source.display()
                )));
            }
            selected.push(report_for(config, &corpus_dir, source)?);
        }
        selected
    } else {
        let base = match &config.test_dir {
            Some(dir) => corpus_dir.join(dir),
            None => corpus_dir.clone(),
        };
        let mut sources = Vec::new();
        collect_test_files(&base, &mut sources)?;
        sources.sort();
        sources
            .into_iter()
            .map(|source| report_for(config, &corpus_dir, source))
            .collect::<RegressResult<Vec<_>>>()?
    };

    // explicit --test-file selection bypasses the skip list and filter
    if config.test_file.is_none() {
        reports.retain(|report| !skip.contains(&report.test_id));
        if let Some(filter) = &config.filter {
            reports.retain(|report| report.test_id.contains(filter.as_str()));
        }
    }

    for report in &mut reports {
        report.ignored = ignore.contains(&report.test_id);
    }

    tracing::info!(count = reports.len(), "tests discovered");
    Ok(reports)
}

/// Recursive walk collecting `.js`/`.mjs` files, skipping `.git` and the
/// helper directory
fn collect_test_files(dir: &Path, out: &mut Vec<PathBuf>) -> RegressResult<()> {
    if !dir.is_dir() {
        return Err(RegressError::Config(format!(
            "test directory not found: {}",
            dir.display()
        )));
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let name = entry.file_name();
        if path.is_dir() {
            if name == ".git" || name == HELPER_DIR {
                continue;
            }
            collect_test_files(&path, out)?;
        } else if matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("js") | Some("mjs")
        ) {
            out.push(path);
        }
    }
    Ok(())
}

fn report_for(
    config: &RunnerConfig,
    corpus_dir: &Path,
    source: PathBuf,
) -> RegressResult<TestReport> {
    let rel = source
        .strip_prefix(corpus_dir)
        .map_err(|_| {
            RegressError::Repo(format!(
                "test file escapes the corpus: {}",
                source.display()
            ))
        })?
        .to_path_buf();

    let rel_slash: String = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    let test_id = format!("{}/{}", CORPUS_DIR_NAME, rel_slash);

    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let out_dir = match rel.parent() {
        Some(parent) if parent != Path::new("") => {
            config.result_dir().join(parent).join(&stem)
        }
        _ => config.result_dir().join(&stem),
    };

    Ok(TestReport::new(source, test_id, out_dir))
}

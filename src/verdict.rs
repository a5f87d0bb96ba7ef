//! Success policies: deciding whether a command outcome passes.
//!
//! Every stage picks one policy; the run stage picks between the expect-file
//! comparison and the stderr assertion depending on whether a sibling `.out`
//! file exists. All three are dispatched through a single `evaluate` call so
//! the decision logic lives in one place.

use std::path::{Path, PathBuf};

use crate::exec::ExecOutcome;
use crate::report::ExitKind;

/// Marker the runtime prints to stderr when a script dies of an unhandled
/// stack overflow
pub const STACK_OVERFLOW_MARKER: &str = "Stack overflow!";

/// Placeholder in `.out` templates standing for the absolute test path
pub const BASENAME_PLACEHOLDER: &str = "*%(basename)s";

/// Exit code tolerated in expect-file mode for tests under a `/fail/` path
pub const FAIL_PATH_EXIT_CODE: i32 = 255;

/// Leading path component every test id carries; substitution swaps it for
/// the corpus base directory
pub const CORPUS_DIR_NAME: &str = "regresstest";

/// How a stage decides pass/fail for an executed command
#[derive(Debug, Clone)]
pub enum SuccessPolicy {
    /// Exit code 0 passes, anything else fails
    ExitCodeOnly,

    /// Combined output must equal the rendered expectation file
    ExpectFileMatch { expect_path: PathBuf },

    /// Exit 0 with stderr free of the stack-overflow marker
    AssertStderr,
}

/// Outcome of applying a policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub passed: bool,
    pub message: Option<String>,
}

impl Verdict {
    fn pass() -> Self {
        Self {
            passed: true,
            message: None,
        }
    }

    fn fail(message: String) -> Self {
        Self {
            passed: false,
            message: Some(message),
        }
    }
}

/// Well-known fatal signals, mapped the way the result log spells them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    SegmentationFault,
    Abort,
    Other(i32),
}

impl SignalKind {
    pub fn classify(signal: i32) -> Self {
        match signal {
            11 => SignalKind::SegmentationFault,
            6 | 4 => SignalKind::Abort,
            other => SignalKind::Other(other),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            SignalKind::SegmentationFault => "Segmentation fault (core dumped)".to_string(),
            SignalKind::Abort => "Aborted (core dumped)".to_string(),
            SignalKind::Other(n) => format!("Unknown Error: {}", n),
        }
    }
}

/// Describe a non-pass exit for the failure message
fn describe_exit(exit: &ExitKind) -> String {
    match exit {
        ExitKind::Code(code) => format!("Unknown Error: {}", code),
        ExitKind::Signaled(sig) => SignalKind::classify(*sig).describe(),
        ExitKind::TimedOut => "timed out".to_string(),
    }
}

/// Render a `.out` expectation template against a test source path.
///
/// `#`-prefixed lines are dropped, then every `*%(basename)s` occurrence is
/// replaced with the test's absolute path. The absolute path is recovered by
/// swapping the test id's leading `regresstest/` component for the corpus
/// base directory, so the substitution round-trips with test-id derivation.
pub fn render_expectation(template: &str, test_id: &str, corpus_dir: &Path) -> String {
    let stripped: String = template
        .lines()
        .filter(|line| !line.starts_with('#'))
        .flat_map(|line| [line, "\n"])
        .collect();

    let rel = test_id
        .strip_prefix(CORPUS_DIR_NAME)
        .map(|rest| rest.trim_start_matches('/'))
        .unwrap_or(test_id);
    let absolute = corpus_dir.join(rel);

    stripped.replace(BASENAME_PLACEHOLDER, &absolute.to_string_lossy())
}

/// Apply a policy to one command outcome.
///
/// `source_path` is the test file the command ran; the expect-file policy
/// needs it for the `/fail/` exit-code exception and the placeholder
/// substitution. `test_id` and `corpus_dir` feed the substitution.
pub fn evaluate(
    policy: &SuccessPolicy,
    outcome: &ExecOutcome,
    source_path: &Path,
    test_id: &str,
    corpus_dir: &Path,
) -> Verdict {
    match policy {
        SuccessPolicy::ExitCodeOnly => match outcome.exit {
            ExitKind::Code(0) => Verdict::pass(),
            ref exit => Verdict::fail(describe_exit(exit)),
        },

        SuccessPolicy::ExpectFileMatch { expect_path } => {
            let template = match std::fs::read_to_string(expect_path) {
                Ok(content) => content,
                Err(err) => {
                    return Verdict::fail(format!(
                        "cannot read expectation {}: {}",
                        expect_path.display(),
                        err
                    ));
                }
            };

            let exit_ok = match outcome.exit {
                ExitKind::Code(0) => true,
                ExitKind::Code(FAIL_PATH_EXIT_CODE) => {
                    source_path.to_string_lossy().contains("/fail/")
                }
                _ => false,
            };
            if !exit_ok {
                return Verdict::fail(describe_exit(&outcome.exit));
            }

            let expected = render_expectation(&template, test_id, corpus_dir);
            let actual = outcome.combined_output();
            if actual == expected {
                Verdict::pass()
            } else {
                Verdict::fail(format!(
                    "output mismatch\nexpected:\n{}\nactual:\n{}",
                    expected, actual
                ))
            }
        }

        SuccessPolicy::AssertStderr => {
            if outcome.exit != ExitKind::Code(0) {
                return Verdict::fail(describe_exit(&outcome.exit));
            }
            if outcome.stderr.contains(STACK_OVERFLOW_MARKER) {
                return Verdict::fail(format!(
                    "unhandled stack overflow:\n{}",
                    outcome.stderr
                ));
            }
            Verdict::pass()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn outcome(exit: ExitKind, stdout: &str, stderr: &str) -> ExecOutcome {
        ExecOutcome {
            exit,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            duration: Duration::ZERO,
        }
    }

    #[test]
    fn test_signal_classification() {
        assert_eq!(
            SignalKind::classify(11).describe(),
            "Segmentation fault (core dumped)"
        );
        assert_eq!(SignalKind::classify(6).describe(), "Aborted (core dumped)");
        assert_eq!(SignalKind::classify(4).describe(), "Aborted (core dumped)");
        assert_eq!(SignalKind::classify(9).describe(), "Unknown Error: 9");
    }

    #[test]
    fn test_exit_code_only() {
        let policy = SuccessPolicy::ExitCodeOnly;
        let src = Path::new("/corpus/regresstest/a.js");
        let corpus = Path::new("/corpus/regresstest");

        let ok = evaluate(&policy, &outcome(ExitKind::Code(0), "", ""), src, "regresstest/a.js", corpus);
        assert!(ok.passed);

        let bad = evaluate(&policy, &outcome(ExitKind::Code(2), "", ""), src, "regresstest/a.js", corpus);
        assert!(!bad.passed);
        assert_eq!(bad.message.as_deref(), Some("Unknown Error: 2"));

        let segv = evaluate(&policy, &outcome(ExitKind::Signaled(11), "", ""), src, "regresstest/a.js", corpus);
        assert_eq!(
            segv.message.as_deref(),
            Some("Segmentation fault (core dumped)")
        );
    }

    #[test]
    fn test_render_expectation_strips_comments() {
        let rendered = render_expectation(
            "# header comment\nline one\n# another\nline two\n",
            "regresstest/sub/case.js",
            Path::new("/base/regresstest"),
        );
        assert_eq!(rendered, "line one\nline two\n");
    }

    #[test]
    fn test_render_expectation_substitutes_basename() {
        let rendered = render_expectation(
            "*%(basename)s foo\n",
            "regresstest/b/c.js",
            Path::new("/a/regresstest"),
        );
        assert_eq!(rendered, "/a/regresstest/b/c.js foo\n");
    }

    #[test]
    fn test_render_expectation_round_trip() {
        let template = "value at *%(basename)s line\n";
        let corpus = Path::new("/work/regresstest");
        let rendered = render_expectation(template, "regresstest/dir/t.js", corpus);

        // reversing the substitution recovers the original template
        let absolute = corpus.join("dir/t.js");
        let recovered = rendered.replace(&*absolute.to_string_lossy(), BASENAME_PLACEHOLDER);
        assert_eq!(recovered, template);
    }

    #[test]
    fn test_assert_mode() {
        let policy = SuccessPolicy::AssertStderr;
        let src = Path::new("/corpus/regresstest/a.js");
        let corpus = Path::new("/corpus/regresstest");

        let clean = evaluate(&policy, &outcome(ExitKind::Code(0), "out", ""), src, "regresstest/a.js", corpus);
        assert!(clean.passed);

        let overflow = evaluate(
            &policy,
            &outcome(ExitKind::Code(0), "", "RangeError: Stack overflow!"),
            src,
            "regresstest/a.js",
            corpus,
        );
        assert!(!overflow.passed);

        let aborted = evaluate(&policy, &outcome(ExitKind::Signaled(6), "", ""), src, "regresstest/a.js", corpus);
        assert_eq!(aborted.message.as_deref(), Some("Aborted (core dumped)"));
    }

    #[test]
    fn test_expect_mode_fail_path_allows_255() {
        use std::io::Write;

        let dir = std::env::temp_dir().join("ark-regress-verdict-test");
        std::fs::create_dir_all(&dir).unwrap();
        let expect_path = dir.join("case.out");
        let mut file = std::fs::File::create(&expect_path).unwrap();
        write!(file, "boom\n").unwrap();

        let policy = SuccessPolicy::ExpectFileMatch {
            expect_path: expect_path.clone(),
        };
        let corpus = Path::new("/corpus/regresstest");

        let in_fail_dir = Path::new("/corpus/regresstest/fail/case.js");
        let allowed = evaluate(
            &policy,
            &outcome(ExitKind::Code(255), "boom\n", ""),
            in_fail_dir,
            "regresstest/fail/case.js",
            corpus,
        );
        assert!(allowed.passed);

        let elsewhere = Path::new("/corpus/regresstest/ok/case.js");
        let rejected = evaluate(
            &policy,
            &outcome(ExitKind::Code(255), "boom\n", ""),
            elsewhere,
            "regresstest/ok/case.js",
            corpus,
        );
        assert!(!rejected.passed);

        std::fs::remove_file(&expect_path).unwrap();
    }

    #[test]
    fn test_expect_mode_compares_combined_output() {
        use std::io::Write;

        let dir = std::env::temp_dir().join("ark-regress-verdict-combined");
        std::fs::create_dir_all(&dir).unwrap();
        let expect_path = dir.join("case.out");
        let mut file = std::fs::File::create(&expect_path).unwrap();
        write!(file, "out\nerr\n").unwrap();

        let policy = SuccessPolicy::ExpectFileMatch {
            expect_path: expect_path.clone(),
        };
        let src = Path::new("/corpus/regresstest/case.js");
        let corpus = Path::new("/corpus/regresstest");

        let matched = evaluate(
            &policy,
            &outcome(ExitKind::Code(0), "out\n", "err\n"),
            src,
            "regresstest/case.js",
            corpus,
        );
        assert!(matched.passed);

        let mismatched = evaluate(
            &policy,
            &outcome(ExitKind::Code(0), "out\n", "other\n"),
            src,
            "regresstest/case.js",
            corpus,
        );
        assert!(!mismatched.passed);
        assert!(mismatched.message.unwrap().contains("output mismatch"));

        std::fs::remove_file(&expect_path).unwrap();
    }
}

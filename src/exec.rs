//! Single subprocess invocation with timeout handling.
//!
//! Every external tool call in the pipeline goes through `run_command`. It
//! never returns an error: spawn failures, signal deaths and timeouts are all
//! folded into the `ExecOutcome` so a broken test can never take down the
//! driver.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tokio::process::Command;

use crate::report::ExitKind;

/// Exit code reported when the command could not be spawned at all
pub const SPAWN_FAILURE_CODE: i32 = 127;

/// A fully-resolved command ready to execute
#[derive(Debug, Clone)]
pub struct CommandSpec {
    /// argv[0] and arguments
    pub argv: Vec<String>,

    /// Extra environment entries (inherited environment is kept)
    pub env: HashMap<String, String>,

    /// Working directory, if different from the harness's
    pub cwd: Option<PathBuf>,

    /// Kill the child after this long
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(argv: Vec<String>, timeout: Duration) -> Self {
        Self {
            argv,
            env: HashMap::new(),
            cwd: None,
            timeout,
        }
    }
}

/// What one command invocation produced
#[derive(Debug, Clone)]
pub struct ExecOutcome {
    pub exit: ExitKind,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl ExecOutcome {
    /// Combined stdout followed by stderr, the stream the expectation
    /// comparison reads
    pub fn combined_output(&self) -> String {
        let mut out = self.stdout.clone();
        out.push_str(&self.stderr);
        out
    }
}

/// Run one command to completion, capturing output.
///
/// The timeout kills the child and yields `ExitKind::TimedOut`. A spawn
/// failure yields `ExitKind::Code(127)` with the OS error on stderr.
pub async fn run_command(spec: &CommandSpec) -> ExecOutcome {
    let start = Instant::now();

    let (program, args) = match spec.argv.split_first() {
        Some(split) => split,
        None => {
            return ExecOutcome {
                exit: ExitKind::Code(SPAWN_FAILURE_CODE),
                stdout: String::new(),
                stderr: "empty command".to_string(),
                duration: start.elapsed(),
            };
        }
    };

    let mut command = Command::new(program);
    command.args(args);
    for (key, value) in &spec.env {
        command.env(key, value);
    }
    if let Some(cwd) = &spec.cwd {
        command.current_dir(cwd);
    }
    command.kill_on_drop(true);
    command.stdin(std::process::Stdio::null());

    let output = tokio::time::timeout(spec.timeout, command.output()).await;
    let duration = start.elapsed();

    match output {
        Err(_) => {
            tracing::warn!(command = %spec.argv.join(" "), "command timed out");
            ExecOutcome {
                exit: ExitKind::TimedOut,
                stdout: String::new(),
                stderr: String::new(),
                duration,
            }
        }
        Ok(Err(err)) => {
            tracing::warn!(command = %spec.argv.join(" "), error = %err, "failed to spawn");
            ExecOutcome {
                exit: ExitKind::Code(SPAWN_FAILURE_CODE),
                stdout: String::new(),
                stderr: err.to_string(),
                duration,
            }
        }
        Ok(Ok(output)) => {
            let exit = classify_status(&output.status);
            ExecOutcome {
                exit,
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                duration,
            }
        }
    }
}

#[cfg(unix)]
fn classify_status(status: &std::process::ExitStatus) -> ExitKind {
    use std::os::unix::process::ExitStatusExt;

    if let Some(sig) = status.signal() {
        tracing::debug!(signal = signal_name(sig), "child killed by signal");
        return ExitKind::Signaled(sig);
    }
    ExitKind::Code(status.code().unwrap_or(SPAWN_FAILURE_CODE))
}

#[cfg(not(unix))]
fn classify_status(status: &std::process::ExitStatus) -> ExitKind {
    ExitKind::Code(status.code().unwrap_or(SPAWN_FAILURE_CODE))
}

/// Human-readable signal name for log lines
#[cfg(unix)]
pub fn signal_name(sig: i32) -> &'static str {
    match nix::sys::signal::Signal::try_from(sig) {
        Ok(signal) => signal.as_str(),
        Err(_) => "UNKNOWN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_successful_command() {
        let spec = CommandSpec::new(
            vec!["true".to_string()],
            Duration::from_secs(5),
        );
        let outcome = run_command(&spec).await;
        assert_eq!(outcome.exit, ExitKind::Code(0));
    }

    #[tokio::test]
    async fn test_failing_command() {
        let spec = CommandSpec::new(
            vec!["false".to_string()],
            Duration::from_secs(5),
        );
        let outcome = run_command(&spec).await;
        assert_eq!(outcome.exit, ExitKind::Code(1));
    }

    #[tokio::test]
    async fn test_captures_stdout() {
        let spec = CommandSpec::new(
            vec!["echo".to_string(), "hello".to_string()],
            Duration::from_secs(5),
        );
        let outcome = run_command(&spec).await;
        assert_eq!(outcome.stdout, "hello\n");
        assert_eq!(outcome.exit, ExitKind::Code(0));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_not_fatal() {
        let spec = CommandSpec::new(
            vec!["/nonexistent/binary/path".to_string()],
            Duration::from_secs(5),
        );
        let outcome = run_command(&spec).await;
        assert_eq!(outcome.exit, ExitKind::Code(SPAWN_FAILURE_CODE));
        assert!(!outcome.stderr.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_kills_child() {
        let spec = CommandSpec::new(
            vec!["sleep".to_string(), "30".to_string()],
            Duration::from_millis(100),
        );
        let outcome = run_command(&spec).await;
        assert_eq!(outcome.exit, ExitKind::TimedOut);
        assert!(outcome.duration < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_env_passed_to_child() {
        let mut spec = CommandSpec::new(
            vec!["sh".to_string(), "-c".to_string(), "echo $REGRESS_PROBE".to_string()],
            Duration::from_secs(5),
        );
        spec.env
            .insert("REGRESS_PROBE".to_string(), "present".to_string());
        let outcome = run_command(&spec).await;
        assert_eq!(outcome.stdout, "present\n");
    }

    #[test]
    fn test_combined_output_order() {
        let outcome = ExecOutcome {
            exit: ExitKind::Code(0),
            stdout: "out\n".to_string(),
            stderr: "err\n".to_string(),
            duration: Duration::ZERO,
        };
        assert_eq!(outcome.combined_output(), "out\nerr\n");
    }
}

//! Run configuration assembled once at startup.
//!
//! Defaults live in consts, a few values can come from environment variables,
//! and everything the stages need is collected into one immutable
//! `RunnerConfig` shared behind an `Arc`. Workers never see mutable or global
//! configuration state.
//!
//! # Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `ARK_REGRESS_REPO_URL` | Regression corpus git URL | gitee mirror |
//! | `ARK_REGRESS_REPO_COMMIT` | Pinned corpus commit | see `DEFAULT_REPO_COMMIT` |

use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{RegressError, RegressResult};

// ============================================================================
// Default Values
// ============================================================================

/// Default regression corpus repository
pub const DEFAULT_REPO_URL: &str = "https://gitee.com/openharmony/arkcompiler_regresstest.git";

/// Pinned corpus commit checked out after cloning
pub const DEFAULT_REPO_COMMIT: &str = "8cbc0e44eb82fd3d7b8ce0ed1b61cdab448db316";

/// Directory name of the corpus checkout under the test root
pub const DEFAULT_CORPUS_DIR: &str = "regresstest";

/// Default per-command timeout (seconds)
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Default worker count for the per-stage fan-out
pub const DEFAULT_PROCESSES: usize = 1;

/// Number of clone attempts before the run is abandoned
pub const CLONE_RETRIES: u32 = 3;

// ============================================================================
// Environment Variable Names
// ============================================================================

/// Environment variable overriding the corpus repository URL
pub const ENV_REPO_URL: &str = "ARK_REGRESS_REPO_URL";

/// Environment variable overriding the pinned corpus commit
pub const ENV_REPO_COMMIT: &str = "ARK_REGRESS_REPO_COMMIT";

// ============================================================================
// Configuration Types
// ============================================================================

/// Target architecture the interpreter binary was built for
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ArkArch {
    X64,
    Aarch64,
    Arm,
}

impl ArkArch {
    /// qemu user-mode binary for foreign-arch execution
    pub fn qemu_binary(&self) -> Option<&'static str> {
        match self {
            ArkArch::X64 => None,
            ArkArch::Aarch64 => Some("qemu-aarch64"),
            ArkArch::Arm => Some("qemu-arm"),
        }
    }
}

/// Immutable configuration for one harness run
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Directory the corpus is cloned under
    pub test_root: PathBuf,

    /// Directory receiving artifacts, logs and reports
    pub out_dir: PathBuf,

    /// Corpus-relative directory to discover tests in (whole corpus if unset)
    pub test_dir: Option<String>,

    /// Single corpus-relative test file to run
    pub test_file: Option<String>,

    /// Explicit test list file
    pub test_list: Option<PathBuf>,

    /// Skip list file (tests excluded from discovery)
    pub skip_list: Option<PathBuf>,

    /// Ignore list file (failures that are not new failures)
    pub ignore_list: Option<PathBuf>,

    /// Regress-group table file
    pub regress_groups: Option<PathBuf>,

    /// Substring filter on test ids
    pub filter: Option<String>,

    /// Per-command timeout
    pub timeout: Duration,

    /// Fan-out width per stage
    pub processes: usize,

    /// Interpreter / runtime binary
    pub ark_tool: PathBuf,

    /// Bytecode frontend compiler binary
    pub ark_frontend_binary: PathBuf,

    /// AOT compiler binary
    pub ark_aot_tool: Option<PathBuf>,

    /// Run the AOT stage
    pub ark_aot: bool,

    /// Run the PGO profiling stage before AOT
    pub run_pgo: bool,

    /// Pass `--compiler-enable-litecg=true` to the AOT compiler
    pub enable_litecg: bool,

    /// Append `--enable-force-gc=false` to every interpreter invocation
    pub disable_force_gc: bool,

    /// Directories joined into the child's LD_LIBRARY_PATH
    pub libs_dir: Option<String>,

    /// ICU data path handed to the interpreter
    pub icu_path: Option<PathBuf>,

    /// Architecture of the toolchain binaries
    pub ark_arch: ArkArch,

    /// Sysroot for qemu user-mode emulation
    pub ark_arch_root: Option<PathBuf>,

    /// Wipe and re-clone the corpus even if present
    pub force_clone: bool,
}

impl RunnerConfig {
    /// Corpus checkout directory
    pub fn corpus_dir(&self) -> PathBuf {
        self.test_root.join(DEFAULT_CORPUS_DIR)
    }

    /// Directory for result.txt, report.xml, test.log and per-test artifacts
    pub fn result_dir(&self) -> PathBuf {
        self.out_dir.join(DEFAULT_CORPUS_DIR)
    }

    /// Corpus repository URL (environment-overridable)
    pub fn repo_url(&self) -> String {
        env::var(ENV_REPO_URL).unwrap_or_else(|_| DEFAULT_REPO_URL.to_string())
    }

    /// Pinned corpus commit (environment-overridable)
    pub fn repo_commit(&self) -> String {
        env::var(ENV_REPO_COMMIT).unwrap_or_else(|_| DEFAULT_REPO_COMMIT.to_string())
    }

    /// Command prefix for foreign-arch interpreter invocations
    pub fn qemu_prefix(&self) -> Vec<String> {
        let Some(qemu) = self.ark_arch.qemu_binary() else {
            return Vec::new();
        };
        let mut prefix = vec![qemu.to_string()];
        if let Some(root) = &self.ark_arch_root {
            prefix.push("-L".to_string());
            prefix.push(root.to_string_lossy().into_owned());
        }
        prefix
    }

    /// Environment entries every child process receives
    pub fn base_env(&self) -> HashMap<String, String> {
        let mut vars = HashMap::new();
        if let Some(libs) = &self.libs_dir {
            vars.insert("LD_LIBRARY_PATH".to_string(), libs.clone());
        }
        vars
    }

    /// Reject inconsistent configurations before any stage runs
    pub fn validate(&self) -> RegressResult<()> {
        if self.run_pgo && !self.ark_aot {
            return Err(RegressError::Config(
                "--run-pgo requires --ark-aot".to_string(),
            ));
        }
        if self.ark_aot && self.ark_aot_tool.is_none() {
            return Err(RegressError::Config(
                "--ark-aot requires --ark-aot-tool".to_string(),
            ));
        }
        if self.test_file.is_some() && self.test_dir.is_some() {
            return Err(RegressError::Config(
                "--test-file and --test-dir are mutually exclusive".to_string(),
            ));
        }
        if self.ark_arch != ArkArch::X64 && self.ark_arch_root.is_none() {
            return Err(RegressError::Config(format!(
                "--ark-arch {:?} requires --ark-arch-root",
                self.ark_arch
            )));
        }
        if self.processes == 0 {
            return Err(RegressError::Config(
                "--processes must be at least 1".to_string(),
            ));
        }
        if !self.ark_tool.is_file() {
            return Err(RegressError::Config(format!(
                "--ark-tool not found: {}",
                self.ark_tool.display()
            )));
        }
        if !self.ark_frontend_binary.is_file() {
            return Err(RegressError::Config(format!(
                "--ark-frontend-binary not found: {}",
                self.ark_frontend_binary.display()
            )));
        }
        if let Some(aot_tool) = &self.ark_aot_tool {
            if !aot_tool.is_file() {
                return Err(RegressError::Config(format!(
                    "--ark-aot-tool not found: {}",
                    aot_tool.display()
                )));
            }
        }
        Ok(())
    }
}

use clap::Parser;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ark_regress::config::{
    ArkArch, DEFAULT_PROCESSES, DEFAULT_TIMEOUT_SECS, RunnerConfig,
};
use ark_regress::error::RegressResult;
use ark_regress::lists::{RegressGroups, load_id_set, load_test_list};
use ark_regress::pipeline::aot::AotStage;
use ark_regress::pipeline::compile::CompileStage;
use ark_regress::pipeline::pgo::PgoStage;
use ark_regress::pipeline::prepare::{discover_tests, prepare_corpus};
use ark_regress::pipeline::run::RunStage;
use ark_regress::pipeline::{Stage, run_pipeline};
use ark_regress::stats::{self, LOG_FILE};

/// Ark Regress - regression test harness for the Ark bytecode toolchain
#[derive(Parser, Debug)]
#[command(
    name = "ark-regress",
    about = "Run the JS regression corpus through the Ark compile/PGO/AOT/run pipeline",
    after_help = "ENVIRONMENT VARIABLES:\n\
        ARK_REGRESS_REPO_URL      Regression corpus git URL\n\
        ARK_REGRESS_REPO_COMMIT   Pinned corpus commit\n\
        ARK_REGRESS_TIMEOUT       Per-command timeout in seconds\n\
        ARK_REGRESS_PROCESSES     Worker count per stage"
)]
struct Args {
    /// Directory the corpus is cloned under
    #[arg(long, default_value = ".")]
    test_root: PathBuf,

    /// Directory receiving artifacts, logs and reports
    #[arg(long, default_value = "out")]
    out_dir: PathBuf,

    /// Corpus-relative directory to discover tests in
    #[arg(long)]
    test_dir: Option<String>,

    /// Single corpus-relative test file to run
    #[arg(long)]
    test_file: Option<String>,

    /// File listing test ids to run, one per line
    #[arg(long)]
    test_list: Option<PathBuf>,

    /// JSON skip list: tests excluded from the run
    #[arg(long)]
    skip_list: Option<PathBuf>,

    /// JSON ignore list: failures that do not count as new failures
    #[arg(long)]
    ignore_list: Option<PathBuf>,

    /// JSON table mapping option groups to member tests
    #[arg(long)]
    regress_groups: Option<PathBuf>,

    /// Only run tests whose id contains this substring
    #[arg(long)]
    filter: Option<String>,

    /// Per-command timeout in seconds
    #[arg(long, env = "ARK_REGRESS_TIMEOUT", default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout: u64,

    /// Worker count for the per-stage fan-out
    #[arg(long, env = "ARK_REGRESS_PROCESSES", default_value_t = DEFAULT_PROCESSES)]
    processes: usize,

    /// Interpreter / runtime binary
    #[arg(long)]
    ark_tool: PathBuf,

    /// Bytecode frontend compiler binary
    #[arg(long)]
    ark_frontend_binary: PathBuf,

    /// AOT compiler binary
    #[arg(long)]
    ark_aot_tool: Option<PathBuf>,

    /// Run the AOT compilation stage
    #[arg(long)]
    ark_aot: bool,

    /// Run the PGO profiling stage (requires --ark-aot)
    #[arg(long)]
    run_pgo: bool,

    /// Enable the litecg backend in the AOT compiler
    #[arg(long)]
    enable_litecg: bool,

    /// Disable forced GC in every interpreter invocation
    #[arg(long)]
    disable_force_gc: bool,

    /// Directories for the child processes' LD_LIBRARY_PATH
    #[arg(long)]
    libs_dir: Option<String>,

    /// ICU data path handed to the interpreter
    #[arg(long)]
    icu_path: Option<PathBuf>,

    /// Architecture of the toolchain binaries
    #[arg(long, value_enum, default_value = "x64")]
    ark_arch: ArkArch,

    /// Sysroot for qemu user-mode emulation of foreign-arch binaries
    #[arg(long)]
    ark_arch_root: Option<PathBuf>,

    /// Wipe and re-clone the corpus even if present
    #[arg(long)]
    force_clone: bool,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,

    /// Log at debug level
    #[arg(long, short = 'v')]
    verbose: bool,
}

impl Args {
    fn to_config(&self) -> RunnerConfig {
        RunnerConfig {
            test_root: self.test_root.clone(),
            out_dir: self.out_dir.clone(),
            test_dir: self.test_dir.clone(),
            test_file: self.test_file.clone(),
            test_list: self.test_list.clone(),
            skip_list: self.skip_list.clone(),
            ignore_list: self.ignore_list.clone(),
            regress_groups: self.regress_groups.clone(),
            filter: self.filter.clone(),
            timeout: Duration::from_secs(self.timeout),
            processes: self.processes,
            ark_tool: self.ark_tool.clone(),
            ark_frontend_binary: self.ark_frontend_binary.clone(),
            ark_aot_tool: self.ark_aot_tool.clone(),
            ark_aot: self.ark_aot,
            run_pgo: self.run_pgo,
            enable_litecg: self.enable_litecg,
            disable_force_gc: self.disable_force_gc,
            libs_dir: self.libs_dir.clone(),
            icu_path: self.icu_path.clone(),
            ark_arch: self.ark_arch,
            ark_arch_root: self.ark_arch_root.clone(),
            force_clone: self.force_clone,
        }
    }
}

fn init_logging(config: &RunnerConfig, verbose: bool) -> RegressResult<()> {
    let result_dir = config.result_dir();
    std::fs::create_dir_all(&result_dir)?;
    let file = std::fs::File::create(result_dir.join(LOG_FILE))?;

    let default_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Arc::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

async fn run(args: Args) -> RegressResult<usize> {
    let config = args.to_config();
    config.validate()?;
    init_logging(&config, args.verbose)?;

    let skip = match &config.skip_list {
        Some(path) => load_id_set(path)?,
        None => HashSet::new(),
    };
    let ignore = match &config.ignore_list {
        Some(path) => load_id_set(path)?,
        None => HashSet::new(),
    };
    let test_list = match &config.test_list {
        Some(path) => Some(load_test_list(path)?),
        None => None,
    };
    let groups = Arc::new(match &config.regress_groups {
        Some(path) => RegressGroups::load(path)?,
        None => RegressGroups::default(),
    });

    prepare_corpus(&config).await?;

    let reports = discover_tests(&config, &skip, &ignore, test_list.as_deref())?;

    let config = Arc::new(config);
    let mut stages: Vec<Arc<dyn Stage>> = vec![Arc::new(CompileStage::new(Arc::clone(&config)))];
    if config.run_pgo {
        stages.push(Arc::new(PgoStage::new(Arc::clone(&config))));
    }
    if config.ark_aot {
        stages.push(Arc::new(AotStage::new(Arc::clone(&config))));
    }
    stages.push(Arc::new(RunStage::new(Arc::clone(&config), groups)));

    let reports = run_pipeline(&stages, reports, config.processes).await;

    let result_dir = config.result_dir();
    stats::write_result_log(&result_dir, &reports)?;
    stats::write_junit(&result_dir, &reports)?;

    let summary = stats::summarize(&reports, config.ignore_list.is_some());
    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        summary.print();
        println!();
        println!("Results: {}", result_dir.display());
    }

    Ok(summary.new_failure_count())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let exit_code = match run(args).await {
        // exit codes are a u8; 256 new failures must not alias to success
        Ok(new_failures) => new_failures.min(255) as i32,
        Err(err) => {
            eprintln!("Error: {}", err);
            1
        }
    };
    std::process::exit(exit_code);
}

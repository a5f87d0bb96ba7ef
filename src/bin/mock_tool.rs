//! # Mock Toolchain Binary
//!
//! Stands in for the frontend compiler, AOT compiler and interpreter in
//! integration tests. Behavior is driven entirely by environment variables so
//! one binary can play every role, and so per-test behavior can be injected
//! through the harness's own `// Environment Variables:` comment mechanism:
//!
//! - `MOCK_TOOL_BEHAVIOR`: `ok` (default), `segv`, `abort`, `sleep`, `exit`
//! - `MOCK_TOOL_STDOUT` / `MOCK_TOOL_STDERR`: text to emit (`\n` escapes
//!   become newlines, so values survive whitespace-separated env comments)
//! - `MOCK_TOOL_EXIT`: exit code for the `exit` behavior
//!
//! Any `--output=<path>` or `--aot-file=<path>` argument is honored by
//! creating the named artifact, mimicking the real tools. All other
//! arguments are accepted and ignored.

use std::env;

fn unescape(text: &str) -> String {
    text.replace("\\n", "\n")
}

fn create_artifact(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Err(err) = std::fs::write(path, b"mock artifact\n") {
        eprintln!("mock_tool: cannot write {}: {}", path, err);
        std::process::exit(2);
    }
}

#[cfg(unix)]
fn die_with(signal: nix::sys::signal::Signal) {
    // The Rust runtime installs its own SIGSEGV handler (for stack-overflow
    // detection) which would otherwise intercept a raised SIGSEGV and turn it
    // into an abort. Reset the disposition to the default so the process
    // actually dies from `signal`.
    unsafe {
        let _ = nix::sys::signal::signal(signal, nix::sys::signal::SigHandler::SigDfl);
    }
    let _ = nix::sys::signal::raise(signal);
    // raise failed somehow; make the death visible anyway
    std::process::abort();
}

fn main() {
    for arg in env::args().skip(1) {
        if let Some(path) = arg
            .strip_prefix("--output=")
            .or_else(|| arg.strip_prefix("--aot-file="))
        {
            create_artifact(path);
        }
    }

    if let Ok(text) = env::var("MOCK_TOOL_STDOUT") {
        print!("{}", unescape(&text));
    }
    if let Ok(text) = env::var("MOCK_TOOL_STDERR") {
        eprint!("{}", unescape(&text));
    }

    let behavior = env::var("MOCK_TOOL_BEHAVIOR").unwrap_or_else(|_| "ok".to_string());
    match behavior.as_str() {
        "ok" => {}
        "exit" => {
            let code = env::var("MOCK_TOOL_EXIT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1);
            std::process::exit(code);
        }
        "sleep" => {
            std::thread::sleep(std::time::Duration::from_secs(3600));
        }
        #[cfg(unix)]
        "segv" => die_with(nix::sys::signal::Signal::SIGSEGV),
        #[cfg(unix)]
        "abort" => die_with(nix::sys::signal::Signal::SIGABRT),
        other => {
            eprintln!("mock_tool: unknown behavior '{}'", other);
            std::process::exit(2);
        }
    }
}

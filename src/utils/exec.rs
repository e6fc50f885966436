//! External command execution.
//!
//! - [`exec!`] runs a command to completion and fails with its stderr when
//!   it exits non-zero (used for the vendor bundler).
//! - [`prepare`] and [`wait_timeout`] build and supervise long-running
//!   children (the audit tool and the static server).
//!
//! Commands come from config as `Vec<String>` (`["npx", "esbuild"]`), so the
//! first element is the program and the rest are leading arguments.

use crate::log;
use anyhow::{Context, Result};
use regex::Regex;
use std::{
    borrow::Cow,
    env,
    ffi::{OsStr, OsString},
    io,
    path::{Path, PathBuf},
    process::{Child, Command, ExitStatus, Output},
    sync::OnceLock,
    thread,
    time::{Duration, Instant},
};

/// Interval between `try_wait` polls while supervising a child.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Package-runner chatter that says nothing about the command itself.
const NOISE_PREFIXES: &[&str] = &[
    "npm notice",
    "npm warn exec",
    "npm WARN exec",
    "Need to install the following packages",
    "Ok to proceed?",
];

/// Run a configured command with extra arguments.
///
/// Empty arguments are dropped, so optional values can be passed as `""`.
///
/// ```ignore
/// exec!(root; &config.build.vendor.command; entry, dest)?;
/// exec!(["node"]; "--version")?;
/// ```
#[macro_export]
macro_rules! exec {
    ($root:expr; $cmd:expr; $($arg:expr),* $(,)?) => {
        $crate::utils::exec::exec(
            Some($root),
            &$crate::utils::exec::args::command_vec($cmd),
            &$crate::utils::exec::args::non_empty(&[$($crate::utils::exec::args::os($arg)),*]),
        )
    };
    ($cmd:expr; $($arg:expr),* $(,)?) => {
        $crate::utils::exec::exec(
            None,
            &$crate::utils::exec::args::command_vec($cmd),
            &$crate::utils::exec::args::non_empty(&[$($crate::utils::exec::args::os($arg)),*]),
        )
    };
}

/// Argument conversions used by [`exec!`].
pub mod args {
    use std::ffi::OsString;

    pub fn os<S: Into<OsString>>(s: S) -> OsString {
        s.into()
    }

    /// Anything usable as a command line: a literal array or a config list.
    pub trait IntoCommand {
        fn into_command(self) -> Vec<OsString>;
    }

    impl<const N: usize> IntoCommand for [&str; N] {
        fn into_command(self) -> Vec<OsString> {
            self.into_iter().map(OsString::from).collect()
        }
    }

    impl IntoCommand for &[String] {
        fn into_command(self) -> Vec<OsString> {
            self.iter().map(OsString::from).collect()
        }
    }

    impl IntoCommand for &Vec<String> {
        fn into_command(self) -> Vec<OsString> {
            self.as_slice().into_command()
        }
    }

    pub fn command_vec<C: IntoCommand>(cmd: C) -> Vec<OsString> {
        cmd.into_command()
    }

    pub fn non_empty(args: &[OsString]) -> Vec<OsString> {
        args.iter().filter(|a| !a.is_empty()).cloned().collect()
    }
}

// ============================================================================
// Running Commands
// ============================================================================

/// Run `cmd args...` in `root` and wait for it.
///
/// Stderr of a successful run is logged minus package-runner noise; a
/// non-zero exit becomes an error carrying stderr (and stdout, if any).
pub fn exec(root: Option<&Path>, cmd: &[OsString], args: &[OsString]) -> Result<Output> {
    let (name, mut command) = prepare(root, cmd, args)?;

    let output = command
        .output()
        .with_context(|| format!("Failed to execute `{name}`"))?;

    if !output.status.success() {
        anyhow::bail!(failure_message(&name, &output));
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let lines = meaningful_lines(&stderr);
    if !lines.is_empty() {
        log!(&name; "{}", lines.join("\n"));
    }
    Ok(output)
}

/// Build an unspawned command. Returns the program name for messages.
pub fn prepare(root: Option<&Path>, cmd: &[OsString], args: &[OsString]) -> Result<(String, Command)> {
    let (program, leading) = cmd.split_first().context("Empty command")?;
    let name = program.to_string_lossy().into_owned();

    let mut command = Command::new(resolve_program(program, root));
    command.args(leading).args(args);
    if let Some(dir) = root {
        command.current_dir(dir);
    }

    Ok((name, command))
}

/// Look `program` up on `PATH` (with `PATHEXT` on Windows, so `npx` finds
/// `npx.cmd`). Names that do not resolve are passed through unchanged and
/// the spawn reports the error.
fn resolve_program(program: &OsStr, root: Option<&Path>) -> PathBuf {
    let cwd = root.map_or_else(|| env::current_dir().unwrap_or_default(), Path::to_path_buf);
    which::which_in(program, env::var_os("PATH"), cwd).unwrap_or_else(|_| PathBuf::from(program))
}

/// Wait for `child` to exit, giving up after `timeout`.
///
/// Returns `Ok(None)` when the deadline passes; the child keeps running and
/// the caller decides how to stop it.
pub fn wait_timeout(child: &mut Child, timeout: Duration) -> io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

// ============================================================================
// Output Handling
// ============================================================================

fn strip_ansi(s: &str) -> Cow<'_, str> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\x1b\[[0-9;]*[A-Za-z]").unwrap());
    re.replace_all(s, "")
}

/// Non-blank lines that are not package-runner noise, ANSI codes removed.
fn meaningful_lines(output: &str) -> Vec<String> {
    output
        .lines()
        .map(|line| strip_ansi(line).trim().to_owned())
        .filter(|line| !line.is_empty() && !NOISE_PREFIXES.iter().any(|p| line.starts_with(p)))
        .collect()
}

fn failure_message(name: &str, output: &Output) -> String {
    let mut message = format!("Command `{name}` failed with {}", output.status);

    let stderr = meaningful_lines(&String::from_utf8_lossy(&output.stderr));
    if !stderr.is_empty() {
        message.push('\n');
        message.push_str(&stderr.join("\n"));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stdout = stdout.trim();
    if !stdout.is_empty() {
        message.push_str("\nStdout:\n");
        message.push_str(stdout);
    }
    message
}

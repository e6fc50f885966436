//! Child process isolation and teardown.
//!
//! Children started by the audit (the static server and the audit tool)
//! run in their own process group, so stopping one also stops whatever it
//! spawned (an `npx` wrapper's node process, a browser).
//!
//! Teardown walks a chain of [`Terminator`]s until one reports the child
//! gone:
//!
//! | Platform | Chain                                            |
//! |----------|--------------------------------------------------|
//! | Unix     | `kill -TERM -<pgid>`, then `kill -KILL -<pgid>`  |
//! | Windows  | `taskkill /PID <pid> /T /F`                      |

use crate::{log, utils::exec::wait_timeout};
use anyhow::{Context, Result};
use std::{
    io,
    process::{Child, Command, Stdio},
    sync::{
        Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

/// How long a terminated child gets to exit before escalation.
pub const GRACE_PERIOD: Duration = Duration::from_secs(3);

// ============================================================================
// Terminators
// ============================================================================

/// One way of stopping a child process tree.
pub trait Terminator {
    fn name(&self) -> &'static str;

    /// Try to stop `child` and its descendants. Returns whether the child
    /// has exited (and been reaped).
    fn terminate(&self, child: &mut Child) -> io::Result<bool>;
}

/// Ask the process group to exit, then wait.
pub struct Graceful {
    pub grace: Duration,
}

impl Terminator for Graceful {
    fn name(&self) -> &'static str {
        "graceful"
    }

    fn terminate(&self, child: &mut Child) -> io::Result<bool> {
        signal_tree(child.id(), Signal::Term)?;
        Ok(wait_timeout(child, self.grace)?.is_some())
    }
}

/// Forcefully kill the whole process tree.
pub struct TreeKill;

impl Terminator for TreeKill {
    fn name(&self) -> &'static str {
        "tree kill"
    }

    fn terminate(&self, child: &mut Child) -> io::Result<bool> {
        let tree = signal_tree(child.id(), Signal::Kill);
        match child.kill() {
            Ok(()) => {}
            // Already exited
            Err(err) if err.kind() == io::ErrorKind::InvalidInput => {}
            Err(err) => tree.map_err(|_| err)?,
        }
        child.wait()?;
        Ok(true)
    }
}

/// The teardown chain for the current platform.
pub fn default_terminators() -> Vec<Box<dyn Terminator + Send>> {
    if cfg!(unix) {
        vec![
            Box::new(Graceful {
                grace: GRACE_PERIOD,
            }),
            Box::new(TreeKill),
        ]
    } else {
        vec![Box::new(TreeKill)]
    }
}

/// Run `terminators` in order until one stops `child`.
///
/// Returns the name of the terminator that succeeded.
pub fn shut_down(child: &mut Child, terminators: &[Box<dyn Terminator + Send>]) -> Option<&'static str> {
    for terminator in terminators {
        match terminator.terminate(child) {
            Ok(true) => return Some(terminator.name()),
            Ok(false) => log!("server"; "{} did not stop pid {}, escalating", terminator.name(), child.id()),
            Err(err) => log!("server"; "{} failed for pid {}: {err}", terminator.name(), child.id()),
        }
    }
    log!("warn"; "process {} may still be running", child.id());
    None
}

// ============================================================================
// Platform Plumbing
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum Signal {
    Term,
    Kill,
}

/// Start `command` in a new process group.
pub fn isolate(command: &mut Command) {
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }
    #[cfg(windows)]
    {
        use std::os::windows::process::CommandExt;
        const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;
        command.creation_flags(CREATE_NEW_PROCESS_GROUP);
    }
}

/// Kill the process tree rooted at `pid` without a `Child` handle.
pub fn kill_tree(pid: u32) -> io::Result<()> {
    signal_tree(pid, Signal::Kill)
}

#[cfg(unix)]
fn signal_tree(pid: u32, signal: Signal) -> io::Result<()> {
    let flag = match signal {
        Signal::Term => "-TERM",
        Signal::Kill => "-KILL",
    };
    // A negative pid addresses the process group created by `isolate`.
    let status = Command::new("kill")
        .args([flag, "--", &format!("-{pid}")])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()?;
    if status.success() {
        Ok(())
    } else {
        Err(io::Error::other(format!("kill {flag} -{pid} exited with {status}")))
    }
}

#[cfg(windows)]
fn signal_tree(pid: u32, signal: Signal) -> io::Result<()> {
    use std::{env, path::PathBuf};

    if matches!(signal, Signal::Term) {
        return Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "console processes cannot be asked to exit",
        ));
    }

    // The system directory may be missing from a user's PATH.
    let system_root = env::var_os("SystemRoot").unwrap_or_else(|| "C:\\Windows".into());
    let system32 = PathBuf::from(system_root).join("System32");
    let path = env::var_os("PATH").unwrap_or_default();
    let search = env::join_paths(std::iter::once(system32.clone()).chain(env::split_paths(&path)))
        .map_err(io::Error::other)?;

    let status = Command::new(system32.join("taskkill.exe"))
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .env("PATH", search)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()?;
    if status.success() {
        Ok(())
    } else {
        Err(io::Error::other(format!("taskkill /PID {pid} exited with {status}")))
    }
}

// ============================================================================
// Interrupt Guard
// ============================================================================

/// Process groups to kill if the user interrupts the audit.
static TRACKED: Mutex<Vec<u32>> = Mutex::new(Vec::new());

pub fn track(pid: u32) {
    if let Ok(mut tracked) = TRACKED.lock() {
        tracked.push(pid);
    }
}

pub fn untrack(pid: u32) {
    if let Ok(mut tracked) = TRACKED.lock() {
        tracked.retain(|&p| p != pid);
    }
}

/// On Ctrl+C, kill every tracked process tree and exit with 130.
///
/// Isolated children do not receive the terminal's interrupt themselves.
/// Installing more than once is a no-op.
pub fn install_interrupt_guard() -> Result<()> {
    static INSTALLED: AtomicBool = AtomicBool::new(false);
    if INSTALLED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }

    ctrlc::set_handler(|| {
        log!("audit"; "interrupted, stopping child processes...");
        let pids = TRACKED.lock().map(|t| t.clone()).unwrap_or_default();
        for pid in pids {
            let _ = kill_tree(pid);
        }
        std::process::exit(130);
    })
    .context("Failed to set Ctrl+C handler")
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};

    fn alive(pid: u32) -> bool {
        Command::new("kill")
            .args(["-0", &pid.to_string()])
            .stderr(Stdio::null())
            .status()
            .is_ok_and(|s| s.success())
    }

    fn sleeper() -> Child {
        let mut command = Command::new("sleep");
        command.arg("30");
        isolate(&mut command);
        command.spawn().unwrap()
    }

    struct Stubborn(Arc<AtomicUsize>);

    impl Terminator for Stubborn {
        fn name(&self) -> &'static str {
            "stubborn"
        }

        fn terminate(&self, _child: &mut Child) -> io::Result<bool> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(false)
        }
    }

    #[test]
    fn test_graceful_stops_group() {
        let mut child = sleeper();
        let pid = child.id();

        let stopped = shut_down(&mut child, &default_terminators());

        assert_eq!(stopped, Some("graceful"));
        assert!(!alive(pid));
    }

    #[test]
    fn test_escalates_to_tree_kill() {
        let mut child = sleeper();
        let pid = child.id();
        let calls = Arc::new(AtomicUsize::new(0));
        let chain: Vec<Box<dyn Terminator + Send>> =
            vec![Box::new(Stubborn(Arc::clone(&calls))), Box::new(TreeKill)];

        let stopped = shut_down(&mut child, &chain);

        assert_eq!(stopped, Some("tree kill"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!alive(pid));
    }

    #[test]
    fn test_tree_kill_after_exit_is_ok() {
        let mut command = Command::new("true");
        isolate(&mut command);
        let mut child = command.spawn().unwrap();
        child.wait().unwrap();

        assert!(TreeKill.terminate(&mut child).unwrap());
    }

    #[test]
    fn test_interrupt_guard_installs_once() {
        assert!(install_interrupt_guard().is_ok());
        assert!(install_interrupt_guard().is_ok());
    }

    #[test]
    fn test_track_untrack() {
        track(999_999);
        assert!(TRACKED.lock().unwrap().contains(&999_999));
        untrack(999_999);
        assert!(!TRACKED.lock().unwrap().contains(&999_999));
    }
}

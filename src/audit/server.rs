//! The static server the audit runs against.
//!
//! By default this executable's own `serve` subcommand is spawned as a
//! child; `[audit.server] command` swaps in any external server. Either
//! way the child lives in its own process group and is torn down when the
//! [`ServerHandle`] is dropped, on success and failure paths alike.

use super::{
    AuditError,
    process::{self, Terminator},
};
use crate::{
    config::SiteConfig,
    log,
    utils::exec::{args::command_vec, prepare},
};
use std::{
    env,
    io::{self, BufRead, BufReader, Read},
    process::{Child, Command, Stdio},
    thread,
    time::Duration,
};

/// Per-request timeout of the liveness probe.
const LIVENESS_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Command Construction
// ============================================================================

/// Build the server command for `port`, serving the build output.
pub fn server_command(config: &SiteConfig, port: u16) -> Result<Command, AuditError> {
    let root = config.get_root();
    let dir = &config.build.output;
    let server = &config.audit.server;

    if !server.command.is_empty() {
        let port = port.to_string();
        let dir = dir.to_string_lossy();
        let args: Vec<String> = server
            .command
            .iter()
            .map(|arg| arg.replace("{port}", &port).replace("{dir}", &dir))
            .collect();
        let (_, command) = prepare(Some(root), &command_vec(&args), &[])
            .map_err(|err| AuditError::ServerSpawn(io::Error::other(err.to_string())))?;
        return Ok(command);
    }

    let exe = env::current_exe().map_err(AuditError::ServerSpawn)?;
    let mut command = Command::new(exe);
    command
        .current_dir(root)
        .arg("--root")
        .arg(root)
        .arg("--config")
        .arg(&config.config_path)
        .args(["serve", "--port", &port.to_string(), "--dir"])
        .arg(dir);
    if server.spa {
        command.arg("--spa");
    }
    Ok(command)
}

// ============================================================================
// Server Handle
// ============================================================================

/// A running server child. Dropping the handle stops the process tree.
pub struct ServerHandle {
    child: Child,
    port: u16,
    terminators: Vec<Box<dyn Terminator + Send>>,
    stopped: bool,
}

impl ServerHandle {
    /// Spawn `command` with the platform's default teardown chain.
    pub fn spawn(command: Command, port: u16) -> Result<Self, AuditError> {
        Self::spawn_with(command, port, process::default_terminators())
    }

    pub fn spawn_with(
        mut command: Command,
        port: u16,
        terminators: Vec<Box<dyn Terminator + Send>>,
    ) -> Result<Self, AuditError> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        process::isolate(&mut command);

        let mut child = command.spawn().map_err(AuditError::ServerSpawn)?;
        process::track(child.id());

        if let Some(stdout) = child.stdout.take() {
            forward_output(stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            forward_output(stderr);
        }

        Ok(Self {
            child,
            port,
            terminators,
            stopped: false,
        })
    }

    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Absolute URL of `page` on this server.
    pub fn url(&self, page: &str) -> String {
        let page = page.trim();
        let slash = if page.starts_with('/') { "" } else { "/" };
        format!("http://127.0.0.1:{}{slash}{page}", self.port)
    }

    /// Wait `settle`, then check that the server answers on `/`.
    ///
    /// Any HTTP response counts as live; only connection failures and
    /// timeouts do not.
    pub fn wait_until_live(&mut self, settle: Duration) -> Result<(), AuditError> {
        thread::sleep(settle);

        if let Ok(Some(status)) = self.child.try_wait() {
            return Err(AuditError::ServerExited(status.to_string()));
        }

        let url = self.url("/");
        let unreachable = |err: reqwest::Error| AuditError::Unreachable {
            url: url.clone(),
            reason: err.to_string(),
        };

        let client = reqwest::blocking::Client::builder()
            .timeout(LIVENESS_TIMEOUT)
            .build()
            .map_err(unreachable)?;
        let response = client.get(&url).send().map_err(unreachable)?;

        log!("server"; "{url} answered {}", response.status());
        Ok(())
    }

    /// Stop the server now instead of at drop.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        let pid = self.pid();
        if let Some(how) = process::shut_down(&mut self.child, &self.terminators) {
            log!("server"; "stopped pid {pid} ({how})");
        }
        process::untrack(pid);
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Relay a child stream to the log, one line at a time.
fn forward_output<R: Read + Send + 'static>(stream: R) {
    thread::spawn(move || {
        for line in BufReader::new(stream).lines().map_while(Result::ok) {
            let line = line.trim_end();
            if !line.is_empty() {
                log!("server"; "{line}");
            }
        }
    });
}

//! Performance audit harness.
//!
//! Serves the build output on a free localhost port, runs the audit tool
//! against each configured page, and enforces the assertion table.
//!
//! ```text
//! find port ──► spawn server ──► settle ──► liveness ──► audit pages ──► evaluate
//!                    │                          │
//!                    │                          └─ unreachable: print manual steps, exit 0
//!                    └─ stopped on every exit path (drop, Ctrl+C)
//! ```

mod lighthouse;
mod port;
mod process;
mod report;
mod server;

pub use port::find_available_port;
pub use report::{PageResult, Violation, evaluate};

use crate::{config::SiteConfig, log};
use anyhow::Result;
use chrono::Local;
use server::{ServerHandle, server_command};
use std::{fs, io, path::PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("no free port among the {count} ports from {start}")]
    NoFreePort { start: u16, count: u16 },

    #[error("build output not found at {0}, run `sitepipe build` first")]
    OutputMissing(PathBuf),

    #[error("failed to start server: {0}")]
    ServerSpawn(#[source] io::Error),

    #[error("server exited before it became reachable ({0})")]
    ServerExited(String),

    #[error("server at {url} is unreachable: {reason}")]
    Unreachable { url: String, reason: String },

    #[error("failed to launch `{tool}`: {source}")]
    ToolSpawn {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error("`{tool}` timed out after {secs}s on {page}")]
    ToolTimeout { tool: String, page: String, secs: u64 },

    #[error("`{tool}` failed on {page} ({status}) without writing a report, see `{log}`")]
    ToolFailed {
        tool: String,
        page: String,
        status: String,
        log: PathBuf,
    },

    #[error("invalid report `{path}`: {reason}")]
    InvalidReport { path: PathBuf, reason: String },
}

/// How an audit run ended.
#[derive(Debug)]
pub enum AuditOutcome {
    /// Every blocking assertion held.
    Passed { pages: usize, warnings: usize },
    /// At least one blocking assertion failed.
    Failed(Vec<Violation>),
    /// Nothing could be measured automatically; instructions were printed.
    Manual,
}

/// Run the full audit. `pages` overrides `[audit] pages` when non-empty.
pub fn run_audit(config: &SiteConfig, pages: &[String]) -> Result<AuditOutcome> {
    let output = &config.build.output;
    if !output.is_dir() {
        return Err(AuditError::OutputMissing(output.clone()).into());
    }

    let audit = &config.audit;
    let pages = if pages.is_empty() { &audit.pages[..] } else { pages };

    let port = find_available_port(audit.start_port)?;
    process::install_interrupt_guard()?;

    log!("audit"; "serving {} on port {port}", output.display());
    let mut server = ServerHandle::spawn(server_command(config, port)?, port)?;

    if let Err(err) = server.wait_until_live(audit.settle()) {
        log!("warn"; "{err}");
        drop(server);
        print_manual_instructions(config, pages, port);
        return Ok(AuditOutcome::Manual);
    }

    let run_dir = audit
        .results_dir
        .join(Local::now().format("%Y%m%d-%H%M%S").to_string());
    fs::create_dir_all(&run_dir)?;

    let mut results = Vec::with_capacity(pages.len());
    let mut failed_pages = 0;
    for (index, (page, label)) in pages.iter().zip(lighthouse::unique_labels(pages)).enumerate() {
        let url = server.url(page);
        let report_path = run_dir.join(format!("{label}.json"));
        log!("audit"; "{url}");

        match lighthouse::audit_page(audit, config.get_root(), page, &url, &report_path, index) {
            Ok(report) => match &report.runtime_error {
                Some(err) => log!("warn"; "{page}: skipped, the tool reported {err}"),
                None => results.push(PageResult::from_report(page, &report_path, &report)),
            },
            Err(err) => {
                log!("error"; "{page}: {err}");
                failed_pages += 1;
            }
        }
    }
    server.shutdown();

    if results.is_empty() {
        log!("warn"; "no page produced a usable report");
        print_manual_instructions(config, pages, port);
        return Ok(AuditOutcome::Manual);
    }

    for result in &results {
        log!("audit"; "{}", result.summary());
    }
    if failed_pages > 0 {
        log!("warn"; "{failed_pages} of {} page(s) could not be audited", pages.len());
    }
    log!("audit"; "reports in {}", run_dir.display());

    let evaluation = evaluate(&results, &audit.assertions);
    evaluation.log();

    Ok(if evaluation.passed() {
        AuditOutcome::Passed {
            pages: results.len(),
            warnings: evaluation.advisory.len(),
        }
    } else {
        AuditOutcome::Failed(evaluation.blocking)
    })
}

/// Steps for auditing by hand when the harness cannot.
fn print_manual_instructions(config: &SiteConfig, pages: &[String], port: u16) {
    let spa = if config.audit.server.spa { " --spa" } else { "" };
    let tool = config.audit.tool.join(" ");

    log!("audit"; "could not audit automatically; to audit by hand:");
    log!(
        "audit";
        "  1. sitepipe serve --port {port} --dir {}{spa}",
        config.build.output.display()
    );
    for page in pages {
        log!("audit"; "  2. {tool} http://127.0.0.1:{port}{page} --view");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_output_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SiteConfig::default();
        config.resolve_paths(dir.path());

        let err = run_audit(&config, &[]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AuditError>(),
            Some(AuditError::OutputMissing(_))
        ));
    }

    #[test]
    fn test_error_messages() {
        let err = AuditError::NoFreePort {
            start: 3000,
            count: 100,
        };
        assert_eq!(err.to_string(), "no free port among the 100 ports from 3000");

        let err = AuditError::ToolTimeout {
            tool: "npx lighthouse".into(),
            page: "/".into(),
            secs: 120,
        };
        assert_eq!(err.to_string(), "`npx lighthouse` timed out after 120s on /");
    }

    #[cfg(unix)]
    mod full_run {
        use super::*;
        use crate::config::{Assertion, Level};
        use std::net::{Ipv4Addr, TcpListener};
        use std::{collections::BTreeMap, path::Path};

        /// A stand-in audit tool. `$1` is the page URL; pages ending in
        /// `/broken` fail without a report, every other page scores 0.85.
        const FAKE_TOOL: &str = r#"case "$1" in */broken) exit 2 ;; esac
            for arg in "$@"; do
              case "$arg" in --output-path=*) out="${arg#--output-path=}" ;; esac
            done
            printf '%s' '{"categories":{"performance":{"score":0.85}}}' > "$out""#;

        fn free_port() -> u16 {
            let probe = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
            probe.local_addr().unwrap().port()
        }

        fn config_in(root: &Path, pages: &[&str], min_score: f64) -> SiteConfig {
            let mut config = SiteConfig::default();
            config.resolve_paths(root);
            fs::create_dir_all(&config.build.output).unwrap();
            fs::write(config.build.output.join("index.html"), "<p>home</p>").unwrap();

            let audit = &mut config.audit;
            audit.pages = pages.iter().map(|p| (*p).to_owned()).collect();
            audit.start_port = free_port();
            audit.settle_ms = 1500;
            audit.timeout_secs = 30;
            audit.tool = vec!["sh".into(), "-c".into(), FAKE_TOOL.into(), "fake-tool".into()];
            audit.server.command = [
                "python3", "-m", "http.server", "{port}", "--bind", "127.0.0.1", "--directory", "{dir}",
            ]
            .map(String::from)
            .to_vec();
            audit.assertions = BTreeMap::from([(
                "categories:performance".to_owned(),
                Assertion {
                    level: Level::Error,
                    min_score: Some(min_score),
                    max_numeric_value: None,
                },
            )]);
            config
        }

        fn has_python() -> bool {
            which::which("python3").is_ok()
        }

        #[test]
        fn test_threshold_failure_after_skipping_broken_page() {
            if !has_python() {
                return;
            }
            let dir = tempfile::tempdir().unwrap();
            let config = config_in(dir.path(), &["/", "/broken"], 0.9);

            let outcome = run_audit(&config, &[]).unwrap();

            let AuditOutcome::Failed(violations) = outcome else {
                panic!("expected a blocking failure, got {outcome:?}");
            };
            assert_eq!(violations.len(), 1);
            assert_eq!(violations[0].page, "/");
            assert_eq!(violations[0].metric, "categories:performance");
            assert!((violations[0].actual - 85.0).abs() < 1e-6);

            // The server is gone once the run returns.
            let port = config.audit.start_port;
            assert!(TcpListener::bind((Ipv4Addr::LOCALHOST, port)).is_ok());
        }

        #[test]
        fn test_page_override_and_passing_threshold() {
            if !has_python() {
                return;
            }
            let dir = tempfile::tempdir().unwrap();
            let config = config_in(dir.path(), &["/broken"], 0.8);

            let outcome = run_audit(&config, &["/".to_owned()]).unwrap();

            assert!(matches!(outcome, AuditOutcome::Passed { pages: 1, warnings: 0 }));
        }

        #[test]
        fn test_no_usable_report_is_manual() {
            if !has_python() {
                return;
            }
            let dir = tempfile::tempdir().unwrap();
            let config = config_in(dir.path(), &["/broken"], 0.9);

            let outcome = run_audit(&config, &[]).unwrap();

            assert!(matches!(outcome, AuditOutcome::Manual));
            assert!(TcpListener::bind((Ipv4Addr::LOCALHOST, config.audit.start_port)).is_ok());
        }
    }
}

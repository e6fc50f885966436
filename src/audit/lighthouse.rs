//! Running the audit tool against one page.
//!
//! Each page gets a fresh browser profile directory, a JSON report at
//! `<run>/<label>.json`, and the tool's stderr at `<run>/<label>.log`.
//! A report on disk is authoritative: the tool often exits non-zero after
//! writing a perfectly good report (a browser that refuses to close, for
//! example), so the exit status only matters when no report appeared.

use super::{AuditError, process, report::Report};
use crate::{
    config::AuditConfig,
    log,
    utils::{
        exec::{args::command_vec, prepare, wait_timeout},
        fs::remove_dir_all,
    },
};
use std::{
    env,
    ffi::OsString,
    fs::{self, File},
    io,
    path::{Path, PathBuf},
    process::{ExitStatus, Stdio},
    time::{SystemTime, UNIX_EPOCH},
};

/// Categories requested from the tool.
const CATEGORIES: &str = "performance,accessibility,best-practices,seo";

// ============================================================================
// Page Labels
// ============================================================================

/// File-name-safe label for a page path: `/` → `home`,
/// `/blog/post.html` → `blog-post`.
pub fn page_label(page: &str) -> String {
    let trimmed = page.trim().trim_matches('/');
    let trimmed = trimmed.strip_suffix(".html").unwrap_or(trimmed);

    let label: String = trimmed
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '-' })
        .collect();
    let label = label.trim_matches('-');

    if label.is_empty() { "home".to_owned() } else { label.to_owned() }
}

/// Labels for every page, suffixed with `-2`, `-3`, ... on collision.
pub fn unique_labels(pages: &[String]) -> Vec<String> {
    let mut seen = rustc_hash::FxHashSet::default();
    pages
        .iter()
        .map(|page| {
            let base = page_label(page);
            let mut label = base.clone();
            let mut n = 1;
            while !seen.insert(label.clone()) {
                n += 1;
                label = format!("{base}-{n}");
            }
            label
        })
        .collect()
}

// ============================================================================
// Browser Profile
// ============================================================================

/// A throwaway browser profile directory, removed on drop.
struct ProfileDir(PathBuf);

impl ProfileDir {
    fn create(index: usize) -> io::Result<Self> {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or_default();
        let path = env::temp_dir().join(format!(
            "sitepipe-profile-{}-{stamp}-{index}",
            std::process::id()
        ));
        fs::create_dir_all(&path)?;
        Ok(Self(path))
    }
}

impl Drop for ProfileDir {
    fn drop(&mut self) {
        // The browser may still hold files open for a moment after exit.
        if let Err(err) = remove_dir_all(&self.0) {
            log!("warn"; "failed to remove browser profile {}: {err}", self.0.display());
        }
    }
}

// ============================================================================
// Tool Invocation
// ============================================================================

/// Arguments appended to `[audit] tool` for one page.
fn tool_args(url: &str, report: &Path, chrome_flags: &[String], profile: &Path) -> Vec<OsString> {
    let profile = profile.display().to_string();
    let profile = if profile.contains(' ') {
        format!("--user-data-dir=\"{profile}\"")
    } else {
        format!("--user-data-dir={profile}")
    };
    let flags = chrome_flags
        .iter()
        .map(String::as_str)
        .chain([profile.as_str()])
        .collect::<Vec<_>>()
        .join(" ");

    vec![
        url.into(),
        "--output=json".into(),
        format!("--output-path={}", report.display()).into(),
        format!("--only-categories={CATEGORIES}").into(),
        format!("--chrome-flags={flags}").into(),
        "--quiet".into(),
    ]
}

enum ToolRun {
    Exited(ExitStatus),
    TimedOut,
    Failed(io::Error),
}

/// Audit `url`, writing the report to `report_path`.
///
/// `index` keeps concurrent profile directories apart.
pub fn audit_page(
    config: &AuditConfig,
    root: &Path,
    page: &str,
    url: &str,
    report_path: &Path,
    index: usize,
) -> Result<Report, AuditError> {
    let tool = config.tool.join(" ");
    let profile = ProfileDir::create(index).map_err(|source| AuditError::ToolSpawn {
        tool: tool.clone(),
        source,
    })?;

    let log_path = report_path.with_extension("log");
    let log_file = File::create(&log_path).map_err(|source| AuditError::ToolSpawn {
        tool: tool.clone(),
        source,
    })?;

    let args = tool_args(url, report_path, &config.chrome_flags, &profile.0);
    let (_, mut command) = prepare(Some(root), &command_vec(&config.tool), &args)
        .map_err(|err| AuditError::ToolSpawn {
            tool: tool.clone(),
            source: io::Error::other(err.to_string()),
        })?;
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(log_file);
    process::isolate(&mut command);

    let mut child = command.spawn().map_err(|source| AuditError::ToolSpawn {
        tool: tool.clone(),
        source,
    })?;
    process::track(child.id());

    let run = match wait_timeout(&mut child, config.timeout()) {
        Ok(Some(status)) => ToolRun::Exited(status),
        Ok(None) => {
            let _ = process::kill_tree(child.id());
            let _ = child.kill();
            let _ = child.wait();
            ToolRun::TimedOut
        }
        Err(err) => {
            let _ = child.kill();
            let _ = child.wait();
            ToolRun::Failed(err)
        }
    };
    process::untrack(child.id());
    drop(profile);

    if report_path.is_file() {
        match &run {
            ToolRun::Exited(status) if status.success() => {}
            ToolRun::Exited(status) => {
                log!("audit"; "{page}: `{tool}` exited with {status} but wrote a report, using it");
            }
            ToolRun::TimedOut => log!("audit"; "{page}: `{tool}` timed out after writing a report, using it"),
            ToolRun::Failed(err) => log!("audit"; "{page}: lost track of `{tool}` ({err}), using its report"),
        }
        return Report::read(report_path);
    }

    Err(match run {
        ToolRun::TimedOut => AuditError::ToolTimeout {
            tool,
            page: page.to_owned(),
            secs: config.timeout_secs,
        },
        ToolRun::Exited(status) => AuditError::ToolFailed {
            tool,
            page: page.to_owned(),
            status: status.to_string(),
            log: log_path,
        },
        ToolRun::Failed(err) => AuditError::ToolFailed {
            tool,
            page: page.to_owned(),
            status: err.to_string(),
            log: log_path,
        },
    })
}

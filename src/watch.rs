//! File system watcher for rebuild-on-change.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Event Loop                           │
//! │                                                             │
//! │  ┌──────────┐   ┌─────────────┐   ┌──────────────────────┐  │
//! │  │ notify   │──▶│ WatchFilter │──▶│     WatchState       │  │
//! │  │ events   │   └─────────────┘   │ Idle ─▶ Debouncing   │  │
//! │  └──────────┘                     │   ▲         │        │  │
//! │                                   │   │         ▼        │  │
//! │  ┌──────────┐                     │   └──── Building     │  │
//! │  │ build    │────────────────────▶│  (finish_build)      │  │
//! │  │ worker   │◀──── spawn ─────────│                      │  │
//! │  └──────────┘                     └──────────────────────┘  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Filesystem events and build results arrive on one channel, so the
//! state machine is only ever touched by the loop thread. At most one build
//! runs at a time; changes seen during a build are kept and trigger one
//! follow-up build after the debounce delay.

use crate::{
    build::{BuildReport, build_site},
    config::SiteConfig,
    log,
    logger::WatchStatus,
    utils::glob::{PatternSet, relative_slash_path},
};
use anyhow::{Context, Result};
use notify::{
    Event, EventKind, RecursiveMode, Watcher,
    event::ModifyKind,
};
use rustc_hash::FxHashSet;
use std::{
    path::{Path, PathBuf},
    sync::mpsc::{self, RecvTimeoutError, Sender},
    thread,
    time::{Duration, Instant},
};

/// Wait used when no deadline is pending.
const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Directory names whose contents never trigger a rebuild.
const IGNORED_DIRS: &[&str] = &[".git", "node_modules"];

// =============================================================================
// Debounce State
// =============================================================================

/// Where the watcher is in its rebuild cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// No pending changes, no build running
    Idle,
    /// Changes pending; a build starts at `deadline` unless more arrive
    Debouncing { deadline: Instant },
    /// A build is running; new changes wait for it to finish
    Building,
}

/// Debounce state machine. Time is passed in so transitions are testable.
#[derive(Debug)]
pub struct WatchState {
    debounce: Duration,
    pending: FxHashSet<PathBuf>,
    phase: Phase,
}

impl WatchState {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            pending: FxHashSet::default(),
            phase: Phase::Idle,
        }
    }

    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Record a changed path. Outside a build this restarts the quiet period.
    pub fn record(&mut self, path: PathBuf, now: Instant) {
        self.pending.insert(path);
        if self.phase != Phase::Building {
            self.phase = Phase::Debouncing {
                deadline: now + self.debounce,
            };
        }
    }

    /// Take the pending batch once the quiet period has elapsed.
    ///
    /// Returns the changed paths (sorted) and enters [`Phase::Building`].
    pub fn poll(&mut self, now: Instant) -> Option<Vec<PathBuf>> {
        match self.phase {
            Phase::Debouncing { deadline } if now >= deadline => {
                self.phase = Phase::Building;
                let mut batch: Vec<PathBuf> = self.pending.drain().collect();
                batch.sort();
                Some(batch)
            }
            _ => None,
        }
    }

    /// Mark the running build as finished. Changes that arrived meanwhile
    /// start a new quiet period.
    pub fn finish_build(&mut self, now: Instant) {
        self.phase = if self.pending.is_empty() {
            Phase::Idle
        } else {
            Phase::Debouncing {
                deadline: now + self.debounce,
            }
        };
    }

    /// How long the loop may block waiting for the next event.
    pub fn timeout(&self, now: Instant) -> Duration {
        match self.phase {
            Phase::Debouncing { deadline } => deadline.saturating_duration_since(now),
            Phase::Idle | Phase::Building => IDLE_TIMEOUT,
        }
    }
}

// =============================================================================
// Path Filter
// =============================================================================

/// Check if path is a temp/backup file (editor artifacts).
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with(".#")
        || name == ".DS_Store"
}

/// `*.min.*` files are build artifacts, never hand-edited sources.
fn is_minified(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.contains(".min."))
}

/// Decides which changed paths count as source changes.
pub struct WatchFilter {
    source: PathBuf,
    output: PathBuf,
    results_dir: PathBuf,
    config_path: PathBuf,
    exclude: PatternSet,
}

impl WatchFilter {
    pub fn new(config: &SiteConfig) -> Self {
        Self {
            source: config.build.source.clone(),
            output: config.build.output.clone(),
            results_dir: config.audit.results_dir.clone(),
            config_path: config.config_path.clone(),
            exclude: PatternSet::new(&config.build.exclude),
        }
    }

    pub fn accepts(&self, path: &Path) -> bool {
        if path == self.config_path {
            log!("watch"; "config changed, restart to apply it");
            return false;
        }
        if is_temp_file(path)
            || is_minified(path)
            || path.starts_with(&self.output)
            || path.starts_with(&self.results_dir)
        {
            return false;
        }
        let Some(rel) = relative_slash_path(path, &self.source) else {
            return false;
        };
        if rel.split('/').any(|part| IGNORED_DIRS.contains(&part)) {
            return false;
        }
        !self.exclude.matches(&rel)
    }
}

const fn is_relevant(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Any
            | EventKind::Create(_)
            | EventKind::Remove(_)
            | EventKind::Modify(ModifyKind::Any | ModifyKind::Data(_) | ModifyKind::Name(_))
    )
}

// =============================================================================
// Event Loop
// =============================================================================

/// Everything the loop reacts to.
enum WatchEvent {
    Fs(notify::Result<Event>),
    Built(Result<BuildReport>),
}

/// Format the changed paths for the log line.
fn describe(batch: &[PathBuf], root: &Path) -> String {
    let first = batch
        .first()
        .map(|p| p.strip_prefix(root).unwrap_or(p).display().to_string())
        .unwrap_or_default();
    match batch.len() {
        0 | 1 => first,
        n => format!("{first} and {} more", n - 1),
    }
}

fn spawn_build(config: &'static SiteConfig, batch: &[PathBuf], tx: Sender<WatchEvent>) {
    log!("watch"; "{} changed, rebuilding...", describe(batch, config.get_root()));
    thread::spawn(move || {
        let result = build_site(config);
        let _ = tx.send(WatchEvent::Built(result));
    });
}

/// Watch the source tree and rebuild on change. Blocks until interrupted.
pub fn watch_for_changes_blocking(config: &'static SiteConfig) -> Result<()> {
    let (tx, rx) = mpsc::channel();
    let fs_tx = tx.clone();
    let mut watcher = notify::recommended_watcher(move |res| {
        let _ = fs_tx.send(WatchEvent::Fs(res));
    })
    .context("Failed to create file watcher")?;

    let source = &config.build.source;
    watcher
        .watch(source, RecursiveMode::Recursive)
        .with_context(|| format!("Failed to watch {}", source.display()))?;
    if config.config_path.exists() {
        watcher
            .watch(&config.config_path, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", config.config_path.display()))?;
    }
    log!("watch"; "watching {} (debounce {}ms)", source.display(), config.watch.debounce_ms);

    let filter = WatchFilter::new(config);
    let mut state = WatchState::new(config.watch.debounce());
    let mut status = WatchStatus::new();

    loop {
        match rx.recv_timeout(state.timeout(Instant::now())) {
            Ok(WatchEvent::Fs(Ok(event))) if is_relevant(&event) => {
                for path in event.paths {
                    if filter.accepts(&path) {
                        state.record(path, Instant::now());
                    }
                }
            }
            Ok(WatchEvent::Fs(Err(err))) => log!("watch"; "error: {err}"),
            Ok(WatchEvent::Built(result)) => {
                match result {
                    Ok(report) => status.success(&report.summary()),
                    Err(err) => status.error("build failed", &format!("{err:#}")),
                }
                state.finish_build(Instant::now());
            }
            Ok(WatchEvent::Fs(Ok(_))) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if let Some(batch) = state.poll(Instant::now()) {
            status.detach();
            spawn_build(config, &batch, tx.clone());
        }
    }

    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const DEBOUNCE: Duration = Duration::from_millis(300);

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_burst_coalesces_into_one_batch() {
        let t0 = Instant::now();
        let mut state = WatchState::new(DEBOUNCE);

        state.record("a.css".into(), t0);
        state.record("b.js".into(), t0 + ms(100));
        state.record("a.css".into(), t0 + ms(200));

        assert_eq!(state.poll(t0 + ms(400)), None);
        assert_eq!(state.timeout(t0 + ms(400)), ms(100));

        let batch = state.poll(t0 + ms(500)).unwrap();
        assert_eq!(batch, vec![PathBuf::from("a.css"), PathBuf::from("b.js")]);
        assert_eq!(state.phase(), Phase::Building);
    }

    #[test]
    fn test_at_most_one_build_at_a_time() {
        let t0 = Instant::now();
        let mut state = WatchState::new(DEBOUNCE);

        state.record("a.css".into(), t0);
        assert!(state.poll(t0 + ms(300)).is_some());

        state.record("c.html".into(), t0 + ms(400));
        assert_eq!(state.phase(), Phase::Building);
        assert_eq!(state.poll(t0 + ms(5000)), None);
        assert_eq!(state.timeout(t0 + ms(5000)), IDLE_TIMEOUT);
    }

    #[test]
    fn test_changes_during_build_trigger_follow_up() {
        let t0 = Instant::now();
        let mut state = WatchState::new(DEBOUNCE);

        state.record("a.css".into(), t0);
        state.poll(t0 + ms(300)).unwrap();
        state.record("c.html".into(), t0 + ms(400));

        let finished = t0 + ms(1000);
        state.finish_build(finished);
        assert_eq!(
            state.phase(),
            Phase::Debouncing {
                deadline: finished + DEBOUNCE
            }
        );

        assert_eq!(state.poll(finished + ms(299)), None);
        assert_eq!(state.poll(finished + ms(300)), Some(vec![PathBuf::from("c.html")]));
    }

    #[test]
    fn test_finish_without_changes_goes_idle() {
        let t0 = Instant::now();
        let mut state = WatchState::new(DEBOUNCE);

        state.record("a.css".into(), t0);
        state.poll(t0 + ms(300)).unwrap();
        state.finish_build(t0 + ms(600));

        assert_eq!(state.phase(), Phase::Idle);
        assert_eq!(state.poll(t0 + ms(10_000)), None);
        assert_eq!(state.timeout(t0), IDLE_TIMEOUT);
    }

    #[test]
    fn test_filter() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = SiteConfig::default();
        config.resolve_paths(dir.path());
        config.config_path = config.get_root().join("sitepipe.toml");
        let root = config.get_root().to_path_buf();
        let filter = WatchFilter::new(&config);

        assert!(filter.accepts(&root.join("css/main.css")));
        assert!(filter.accepts(&root.join("index.html")));

        assert!(!filter.accepts(&root.join("dist/index.html")));
        assert!(!filter.accepts(&root.join("lighthouse-results/run/home.json")));
        assert!(!filter.accepts(&root.join("node_modules/x/index.js")));
        assert!(!filter.accepts(&root.join("js/vendor.min.js")));
        assert!(!filter.accepts(&root.join("index.html.swp")));
        assert!(!filter.accepts(&root.join("notes~")));
        assert!(!filter.accepts(&root.join("sitepipe.toml")));
        assert!(!filter.accepts(Path::new("/elsewhere/a.css")));
    }

    #[test]
    fn test_describe() {
        let root = Path::new("/site");
        assert_eq!(describe(&[PathBuf::from("/site/a.css")], root), "a.css");
        assert_eq!(
            describe(&[PathBuf::from("/site/a.css"), PathBuf::from("/site/b.js")], root),
            "a.css and 1 more"
        );
    }
}

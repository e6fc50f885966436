//! Asset pipeline orchestration.
//!
//! # Architecture
//!
//! ```text
//! build_site()
//!     │
//!     ├── clean_output()      remove + recreate the output directory
//!     ├── BuildRun::resolve() one walk, classify, apply exclusions
//!     │
//!     ├── markup    ──► embed data (target page) ──► minify
//!     ├── styles    ──► purge against markup/script tokens ──► minify
//!     ├── scripts   ──► minify (fallback: copy original)
//!     ├── vendor    ──► bundle (best-effort)
//!     └── images / verbatim ──► copy
//! ```
//!
//! Stage order is fixed and every run starts from an empty output
//! directory, so two builds over an unchanged tree produce the same output.

use crate::{
    compiler::{
        AssetClass, BuildRun, Processed, bundle_vendor, copy_asset, process_markup,
        process_script, process_style,
    },
    config::{BuildConfig, SiteConfig},
    log,
    utils::{fs::remove_dir_all, purge::Purger},
};
use anyhow::{Context, Result};
use std::{
    fs,
    path::Path,
    time::{Duration, Instant},
};

// ============================================================================
// Statistics
// ============================================================================

/// Byte accounting for one build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    /// Files written (vendor bundle excluded)
    pub files: usize,
    pub input_bytes: u64,
    /// Output bytes of source files (vendor bundle excluded)
    pub output_bytes: u64,
    pub vendor_bytes: u64,
    /// Files written untransformed after a transform failure
    pub fallbacks: usize,
}

impl BuildStats {
    fn record(&mut self, processed: Processed) {
        self.files += 1;
        self.input_bytes += processed.input;
        self.output_bytes += processed.output;
        if processed.fallback {
            self.fallbacks += 1;
        }
    }

    /// Everything written, vendor bundle included.
    pub const fn total_output(&self) -> u64 {
        self.output_bytes + self.vendor_bytes
    }

    /// Fraction of input bytes saved, counting the vendor bundle as output.
    #[allow(clippy::cast_precision_loss)]
    pub fn reduction(&self) -> f64 {
        if self.input_bytes == 0 {
            return 0.0;
        }
        1.0 - self.total_output() as f64 / self.input_bytes as f64
    }

    /// Fraction of input bytes saved by the transforms alone.
    #[allow(clippy::cast_precision_loss)]
    pub fn effective_reduction(&self) -> f64 {
        if self.input_bytes == 0 {
            return 0.0;
        }
        1.0 - self.output_bytes as f64 / self.input_bytes as f64
    }
}

/// Result of a successful build.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub stats: BuildStats,
    pub elapsed: Duration,
}

impl BuildReport {
    /// One-line summary for logs and the watch status line.
    pub fn summary(&self) -> String {
        let stats = &self.stats;
        let mut line = format!(
            "{} files, {} → {} ({:.1}% smaller, {:.1}% excluding vendor) in {}ms",
            stats.files,
            format_bytes(stats.input_bytes),
            format_bytes(stats.total_output()),
            stats.reduction() * 100.0,
            stats.effective_reduction() * 100.0,
            self.elapsed.as_millis(),
        );
        if stats.fallbacks > 0 {
            line.push_str(&format!(", {} fallback(s)", stats.fallbacks));
        }
        line
    }
}

// ============================================================================
// Build
// ============================================================================

/// Run the full asset pipeline.
///
/// Fails on unreadable sources, unwritable outputs or invalid markup.
/// Per-file transform failures and vendor failures only warn.
pub fn build_site(config: &SiteConfig) -> Result<BuildReport> {
    let build = &config.build;
    let start = Instant::now();

    clean_output(&build.output)?;
    fs::create_dir_all(&build.output).with_context(|| {
        format!("Failed to create output directory: {}", build.output.display())
    })?;

    let run = BuildRun::resolve(build);
    log!("build"; "{}", run.summary());
    if run.total() == 0 {
        log!("warn"; "no source files matched in {}", build.source.display());
    }
    match (build.minify, build.purge) {
        (false, false) => log!("build"; "minify and purge disabled"),
        (false, true) => log!("build"; "minify disabled"),
        (true, false) => log!("build"; "purge disabled"),
        (true, true) => {}
    }

    let mut stats = BuildStats::default();

    for file in run.files(AssetClass::Markup) {
        stats.record(process_markup(file, build)?);
    }

    let purger = build.purge.then(|| collect_usage(&run, build));
    for file in run.files(AssetClass::Styles) {
        stats.record(process_style(file, build, purger.as_ref())?);
    }

    for file in run.files(AssetClass::Scripts) {
        stats.record(process_script(file, build)?);
    }

    if build.vendor.enable {
        match bundle_vendor(build) {
            Ok(bytes) => {
                log!("vendor"; "{} → {}", build.vendor.name, build.vendor.output.display());
                stats.vendor_bytes = bytes;
            }
            Err(err) => log!("warn"; "{} skipped: {err}", build.vendor.name),
        }
    }

    for file in run.files(AssetClass::Images).iter().chain(run.files(AssetClass::Verbatim)) {
        stats.record(copy_asset(file, &build.output)?);
    }

    let report = BuildReport {
        stats,
        elapsed: start.elapsed(),
    };
    log!("build"; "{}", report.summary());
    Ok(report)
}

/// Remove the output directory.
pub fn clean(config: &SiteConfig) -> Result<()> {
    let output = &config.build.output;
    if !output.exists() {
        log!("clean"; "nothing to clean");
        return Ok(());
    }
    clean_output(output)?;
    log!("clean"; "removed {}", output.display());
    Ok(())
}

/// Remove the output directory, retrying while another process holds it.
fn clean_output(output: &Path) -> Result<()> {
    remove_dir_all(output)
        .with_context(|| format!("Failed to clear output directory: {}", output.display()))
}

/// Gather usage tokens from every markup and script source.
fn collect_usage(run: &BuildRun, config: &BuildConfig) -> Purger {
    let mut purger = Purger::new(&config.safelist);
    for file in run.files(AssetClass::Markup).iter().chain(run.files(AssetClass::Scripts)) {
        match fs::read_to_string(&file.path) {
            Ok(content) => purger.scan(&content),
            Err(err) => log!("warn"; "{}: not scanned for purge: {err}", file.rel),
        }
    }
    log!("build"; "purge: {} distinct tokens in use", purger.token_count());
    purger
}

/// Human-readable byte size.
#[allow(clippy::cast_precision_loss)]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::collect_all_files;
    use std::path::PathBuf;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn site(root: &Path) -> SiteConfig {
        write(root, "index.html", "<html><head><title>Home</title></head><body><div class=\"card\">Hi</div><script src=\"js/app.js\"></script></body></html>");
        write(root, "about.html", "<html><body><p class=\"lead\">About</p></body></html>");
        write(root, "css/main.css", ".card { padding: 1rem; }\n.lead { font-size: 2rem; }\n.unused { color: red; }\n");
        write(root, "js/app.js", "function toggle(el) {\n  el.classList.toggle('is-open');\n}\n");
        write(root, "img/logo.svg", "<svg xmlns=\"http://www.w3.org/2000/svg\"></svg>");
        write(root, "robots.txt", "User-agent: *\n");
        write(root, "data/results.csv", "name,score\nAlpha,42\n");
        write(root, "node_modules/chart.js/dist/chart.umd.js", "var Chart = function () {};\n");

        let mut config = SiteConfig::default();
        config.resolve_paths(root);
        config
    }

    fn snapshot(dir: &Path) -> Vec<(PathBuf, Vec<u8>)> {
        collect_all_files(dir, Path::new(""))
            .into_iter()
            .map(|path| {
                let bytes = fs::read(&path).unwrap();
                (path.strip_prefix(dir).unwrap().to_path_buf(), bytes)
            })
            .collect()
    }

    #[test]
    fn test_build_writes_every_class() {
        let dir = tempfile::tempdir().unwrap();
        let config = site(dir.path());
        let output = &config.build.output;

        let report = build_site(&config).unwrap();

        for rel in [
            "index.html",
            "about.html",
            "css/main.css",
            "js/app.js",
            "img/logo.svg",
            "robots.txt",
            "data/results.csv",
            "js/vendor/chart.umd.min.js",
        ] {
            assert!(output.join(rel).is_file(), "missing {rel}");
        }

        let css = fs::read_to_string(output.join("css/main.css")).unwrap();
        assert!(css.contains(".card"));
        assert!(!css.contains(".unused"));

        let index = fs::read_to_string(output.join("index.html")).unwrap();
        assert!(index.contains("embedded-csv-rows"));

        assert_eq!(report.stats.files, 7);
        assert!(report.stats.vendor_bytes > 0);
        assert_eq!(report.stats.fallbacks, 0);
    }

    #[test]
    fn test_build_is_idempotent_and_removes_stale_files() {
        let dir = tempfile::tempdir().unwrap();
        let config = site(dir.path());
        let output = config.build.output.clone();

        build_site(&config).unwrap();
        let first = snapshot(&output);

        write(&output, "stale/old.html", "<p>old</p>");
        build_site(&config).unwrap();
        let second = snapshot(&output);

        assert_eq!(first, second);
        assert!(!output.join("stale").exists());
    }

    #[test]
    fn test_excluded_files_never_reach_output() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = site(dir.path());
        write(dir.path(), "drafts/secret.html", "<p>draft</p>");
        write(dir.path(), "js/lib.min.js", "var a=1;");
        config.build.exclude.push("drafts/**".into());

        build_site(&config).unwrap();
        let output = &config.build.output;

        assert!(!output.join("drafts/secret.html").exists());
        assert!(!output.join("js/lib.min.js").exists());
        assert!(!output.join("node_modules").exists());
    }

    #[test]
    fn test_script_fallback_does_not_fail_build() {
        let dir = tempfile::tempdir().unwrap();
        let config = site(dir.path());
        let broken = "function broken( {\n";
        write(dir.path(), "js/broken.js", broken);

        let report = build_site(&config).unwrap();

        assert_eq!(report.stats.fallbacks, 1);
        assert_eq!(
            fs::read_to_string(config.build.output.join("js/broken.js")).unwrap(),
            broken
        );
    }

    #[test]
    fn test_missing_vendor_entry_only_warns() {
        let dir = tempfile::tempdir().unwrap();
        let config = site(dir.path());
        fs::remove_dir_all(dir.path().join("node_modules")).unwrap();

        let report = build_site(&config).unwrap();

        assert_eq!(report.stats.vendor_bytes, 0);
        assert!(config.build.output.join("index.html").is_file());
    }

    #[test]
    fn test_dev_build_copies_sources() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = site(dir.path());
        config.build.minify = false;
        config.build.purge = false;

        build_site(&config).unwrap();

        let css = fs::read_to_string(config.build.output.join("css/main.css")).unwrap();
        assert!(css.contains(".unused { color: red; }"));
    }

    #[test]
    fn test_clean() {
        let dir = tempfile::tempdir().unwrap();
        let config = site(dir.path());
        build_site(&config).unwrap();
        assert!(config.build.output.exists());

        clean(&config).unwrap();
        assert!(!config.build.output.exists());
        clean(&config).unwrap();
    }

    #[test]
    fn test_stats_reduction() {
        let stats = BuildStats {
            files: 2,
            input_bytes: 1000,
            output_bytes: 400,
            vendor_bytes: 100,
            fallbacks: 0,
        };
        assert!((stats.reduction() - 0.5).abs() < 1e-9);
        assert!((stats.effective_reduction() - 0.6).abs() < 1e-9);
        assert_eq!(BuildStats::default().reduction(), 0.0);
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1536), "1.5 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }
}

//! Asset classification and per-class processing.
//!
//! - **markup**: Embed data blocks, minify HTML
//! - **styles**: Purge unused rules, minify CSS
//! - **scripts**: Minify JavaScript
//! - **vendor**: Bundle the chart library
//! - **assets**: Copy images and verbatim files
//!
//! # Build Flow
//!
//! ```text
//! BuildRun::resolve() ──► markup ──► styles ──► scripts ──► vendor ──► images/verbatim
//!        │                  │           │           │          │              │
//!        ▼                  ▼           ▼           ▼          ▼              ▼
//!   SourceFile[]        HTML files  CSS files   JS files   bundle         copies
//! ```

pub mod assets;
pub mod embed;
pub mod markup;
pub mod scripts;
pub mod styles;
pub mod vendor;

use crate::{
    config::BuildConfig,
    utils::glob::{PatternSet, relative_slash_path},
};
use std::{
    fmt,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

pub use assets::copy_asset;
pub use markup::process_markup;
pub use scripts::process_script;
pub use styles::process_style;
pub use vendor::bundle_vendor;

// ============================================================================
// Asset Classes
// ============================================================================

/// Asset classes in processing order. A file belongs to the first class
/// whose patterns match it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetClass {
    Markup,
    Styles,
    Scripts,
    Images,
    Verbatim,
}

impl AssetClass {
    pub const ALL: [Self; 5] = [
        Self::Markup,
        Self::Styles,
        Self::Scripts,
        Self::Images,
        Self::Verbatim,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Markup => "markup",
            Self::Styles => "styles",
            Self::Scripts => "scripts",
            Self::Images => "images",
            Self::Verbatim => "verbatim",
        }
    }

    fn patterns(self, config: &BuildConfig) -> &[String] {
        let patterns = &config.patterns;
        match self {
            Self::Markup => &patterns.markup,
            Self::Styles => &patterns.styles,
            Self::Scripts => &patterns.scripts,
            Self::Images => &patterns.images,
            Self::Verbatim => &patterns.verbatim,
        }
    }
}

impl fmt::Display for AssetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Source Files
// ============================================================================

/// A file under the source root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Absolute path on disk
    pub path: PathBuf,
    /// `/`-separated path relative to the source root
    pub rel: String,
}

impl SourceFile {
    /// Destination of this file under `output`.
    pub fn dest(&self, output: &Path) -> PathBuf {
        output.join(&self.rel)
    }
}

/// Byte counts for one processed file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Processed {
    pub input: u64,
    pub output: u64,
    /// A transform failed and the untransformed content was written.
    pub fallback: bool,
}

impl Processed {
    pub const fn new(input: usize, output: usize, fallback: bool) -> Self {
        Self {
            input: input as u64,
            output: output as u64,
            fallback,
        }
    }

    pub const fn copied(bytes: u64) -> Self {
        Self {
            input: bytes,
            output: bytes,
            fallback: false,
        }
    }
}

/// Files to ignore during directory traversal
const IGNORED_FILES: &[&str] = &[".DS_Store", "Thumbs.db"];

/// Directories never descended into.
const IGNORED_DIRS: &[&str] = &[".git", "node_modules"];

/// Collect every file under `dir`, skipping `skip_dir` and the ignored
/// directories. Sorted by path for a stable build order.
pub fn collect_all_files(dir: &Path, skip_dir: &Path) -> Vec<PathBuf> {
    WalkDir::new(dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            if e.depth() == 0 || !e.file_type().is_dir() {
                return true;
            }
            let name = e.file_name().to_str().unwrap_or_default();
            e.path() != skip_dir && !IGNORED_DIRS.contains(&name)
        })
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            let name = e.file_name().to_str().unwrap_or_default();
            !IGNORED_FILES.contains(&name)
        })
        .map(walkdir::DirEntry::into_path)
        .collect()
}

// ============================================================================
// Build Run
// ============================================================================

/// Snapshot of the resolved file lists for one build.
///
/// Resolved once at the start of a build; files created mid-build are
/// picked up by the next one.
#[derive(Debug, Default)]
pub struct BuildRun {
    pub markup: Vec<SourceFile>,
    pub styles: Vec<SourceFile>,
    pub scripts: Vec<SourceFile>,
    pub images: Vec<SourceFile>,
    pub verbatim: Vec<SourceFile>,
    /// Files matched by an exclusion pattern
    pub excluded: usize,
}

impl BuildRun {
    /// Walk the source tree and assign each file to its asset class.
    ///
    /// Exclusions apply before any class is considered, so an excluded file
    /// is never read, transformed or copied.
    pub fn resolve(config: &BuildConfig) -> Self {
        let exclude = PatternSet::new(&config.exclude);
        let classes: Vec<(AssetClass, PatternSet)> = AssetClass::ALL
            .into_iter()
            .map(|class| (class, PatternSet::new(class.patterns(config))))
            .collect();

        let mut run = Self::default();
        for path in collect_all_files(&config.source, &config.output) {
            if path.starts_with(&config.output) {
                continue;
            }
            let Some(rel) = relative_slash_path(&path, &config.source) else {
                continue;
            };
            if exclude.matches(&rel) {
                run.excluded += 1;
                continue;
            }
            if let Some((class, _)) = classes.iter().find(|(_, set)| set.matches(&rel)) {
                run.files_mut(*class).push(SourceFile { path, rel });
            }
        }
        run
    }

    pub fn files(&self, class: AssetClass) -> &[SourceFile] {
        match class {
            AssetClass::Markup => &self.markup,
            AssetClass::Styles => &self.styles,
            AssetClass::Scripts => &self.scripts,
            AssetClass::Images => &self.images,
            AssetClass::Verbatim => &self.verbatim,
        }
    }

    fn files_mut(&mut self, class: AssetClass) -> &mut Vec<SourceFile> {
        match class {
            AssetClass::Markup => &mut self.markup,
            AssetClass::Styles => &mut self.styles,
            AssetClass::Scripts => &mut self.scripts,
            AssetClass::Images => &mut self.images,
            AssetClass::Verbatim => &mut self.verbatim,
        }
    }

    pub fn total(&self) -> usize {
        AssetClass::ALL.iter().map(|c| self.files(*c).len()).sum()
    }

    /// One-line summary such as `3 markup, 2 styles, 0 scripts, ...`,
    /// ending with the excluded count when anything was excluded.
    pub fn summary(&self) -> String {
        let mut summary = AssetClass::ALL
            .iter()
            .map(|c| format!("{} {}", self.files(*c).len(), c))
            .collect::<Vec<_>>()
            .join(", ");
        if self.excluded > 0 {
            summary.push_str(&format!(", {} excluded", self.excluded));
        }
        summary
    }
}

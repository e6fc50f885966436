//! `[build]` section configuration.
//!
//! Contains paths, per-class glob patterns, exclusions and transform options.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// `[build]` section in sitepipe.toml - asset pipeline configuration.
///
/// # Example
/// ```toml
/// [build]
/// source = "."
/// output = "dist"
/// minify = true
/// purge = true
/// safelist = ["is-open"]
/// exclude = ["dist/**", "node_modules/**"]
///
/// [build.patterns]
/// scripts = ["js/**/*.js"]
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    /// Project root directory (usually set via CLI `--root`).
    #[serde(default = "defaults::build::root")]
    #[educe(Default = defaults::build::root())]
    pub root: Option<PathBuf>,

    /// Source tree the patterns are resolved against.
    #[serde(default = "defaults::build::source")]
    #[educe(Default = defaults::build::source())]
    pub source: PathBuf,

    /// Build output directory. Removed and recreated on every build.
    #[serde(default = "defaults::build::output")]
    #[educe(Default = defaults::build::output())]
    pub output: PathBuf,

    /// Minify markup, styles and scripts.
    #[serde(default = "defaults::r#true")]
    #[educe(Default = true)]
    pub minify: bool,

    /// Drop style rules whose selectors never appear in markup or scripts.
    #[serde(default = "defaults::r#true")]
    #[educe(Default = true)]
    pub purge: bool,

    /// Class or id names that survive purging even when unreferenced
    /// (e.g. classes added at runtime).
    #[serde(default)]
    pub safelist: Vec<String>,

    /// Patterns excluded from every asset class.
    #[serde(default = "defaults::build::exclude")]
    #[educe(Default = defaults::build::exclude())]
    pub exclude: Vec<String>,

    /// Glob patterns per asset class.
    #[serde(default)]
    pub patterns: PatternConfig,

    /// Vendor chart bundle.
    #[serde(default)]
    pub vendor: VendorConfig,

    /// Data blocks embedded into one page.
    #[serde(default)]
    pub embed: EmbedConfig,
}

// ============================================================================
// Sub-configurations
// ============================================================================

/// `[build.patterns]` section - git-style wildmatch patterns relative to
/// the source root. `*` stops at `/`, `**` crosses directories.
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct PatternConfig {
    #[serde(default = "defaults::build::patterns::markup")]
    #[educe(Default = defaults::build::patterns::markup())]
    pub markup: Vec<String>,

    #[serde(default = "defaults::build::patterns::styles")]
    #[educe(Default = defaults::build::patterns::styles())]
    pub styles: Vec<String>,

    #[serde(default = "defaults::build::patterns::scripts")]
    #[educe(Default = defaults::build::patterns::scripts())]
    pub scripts: Vec<String>,

    #[serde(default = "defaults::build::patterns::images")]
    #[educe(Default = defaults::build::patterns::images())]
    pub images: Vec<String>,

    /// Files copied byte-for-byte.
    #[serde(default = "defaults::build::patterns::verbatim")]
    #[educe(Default = defaults::build::patterns::verbatim())]
    pub verbatim: Vec<String>,
}

/// `[build.vendor]` section - the interactive chart library bundle.
///
/// With an empty `command` the entry file is minified in-process; otherwise
/// the command runs from the project root with `<entry> <output>` appended.
///
/// # Example
/// ```toml
/// [build.vendor]
/// name = "chart.js"
/// entry = "node_modules/chart.js/dist/chart.umd.js"
/// output = "js/vendor/chart.umd.min.js"
/// command = ["npx", "esbuild", "--bundle", "--minify"]
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct VendorConfig {
    #[serde(default = "defaults::r#true")]
    #[educe(Default = true)]
    pub enable: bool,

    /// Display name used in logs.
    #[serde(default = "defaults::build::vendor::name")]
    #[educe(Default = defaults::build::vendor::name())]
    pub name: String,

    /// Entry file, relative to the project root.
    #[serde(default = "defaults::build::vendor::entry")]
    #[educe(Default = defaults::build::vendor::entry())]
    pub entry: PathBuf,

    /// Bundle path, relative to the output directory.
    #[serde(default = "defaults::build::vendor::output")]
    #[educe(Default = defaults::build::vendor::output())]
    pub output: PathBuf,

    /// External bundler command.
    #[serde(default)]
    pub command: Vec<String>,
}

/// `[build.embed]` section - inert data blocks for one page.
///
/// Paths of the data files are relative to `<source>/<data_dir>`.
/// An empty `page` disables the hook.
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct EmbedConfig {
    /// Markup file (relative to the source root, `/`-separated).
    #[serde(default = "defaults::build::embed::page")]
    #[educe(Default = defaults::build::embed::page())]
    pub page: String,

    #[serde(default = "defaults::build::embed::data_dir")]
    #[educe(Default = defaults::build::embed::data_dir())]
    pub data_dir: PathBuf,

    #[serde(default = "defaults::build::embed::json")]
    #[educe(Default = defaults::build::embed::json())]
    pub json: String,

    #[serde(default = "defaults::build::embed::csv")]
    #[educe(Default = defaults::build::embed::csv())]
    pub csv: String,
}

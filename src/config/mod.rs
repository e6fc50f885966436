//! Project configuration management for `sitepipe.toml`.
//!
//! # Sections
//!
//! | Section            | Purpose                                           |
//! |--------------------|---------------------------------------------------|
//! | `[build]`          | Source/output paths, patterns, exclusions, minify |
//! | `[build.patterns]` | Glob patterns per asset class                     |
//! | `[build.vendor]`   | Chart library bundle                              |
//! | `[build.embed]`    | JSON/CSV data embedded into one page              |
//! | `[watch]`          | Debounce delay for rebuild-on-change              |
//! | `[audit]`          | Pages, server, audit tool, assertions             |
//!
//! Every section is optional; a project without `sitepipe.toml` builds
//! with the defaults.

mod audit;
mod build;
pub mod defaults;
mod error;
mod watch;

pub use audit::{AuditConfig, Assertion, CATEGORY_METRICS, Level, TIMING_METRICS};
pub use build::BuildConfig;
pub use error::ConfigError;

use crate::cli::Cli;
use anyhow::{Result, bail};
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};
use watch::WatchConfig;

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure representing sitepipe.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    /// Absolute path to the config file (set after loading)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Asset pipeline settings
    #[serde(default)]
    pub build: BuildConfig,

    /// Watch mode settings
    #[serde(default)]
    pub watch: WatchConfig,

    /// Audit harness settings
    #[serde(default)]
    pub audit: AuditConfig,
}

impl SiteConfig {
    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Toml)?;
        Ok(config)
    }

    /// Load configuration from file path
    pub fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        Self::from_str(&content)
    }

    /// Load the config named on the command line, falling back to defaults
    /// when the file does not exist, then apply CLI overrides.
    pub fn load(cli: &Cli) -> Result<Self> {
        let root = cli.root.as_deref().unwrap_or(Path::new("./"));
        let config_path = root.join(&cli.config);

        let mut config = if config_path.exists() {
            Self::from_path(&config_path)?
        } else {
            Self::default()
        };
        config.update_with_cli(cli);
        Ok(config)
    }

    /// Get the root directory path
    pub fn get_root(&self) -> &Path {
        self.build.root.as_deref().unwrap_or(Path::new("./"))
    }

    /// Set the root directory path
    pub fn set_root(&mut self, path: &Path) {
        self.build.root = Some(path.to_path_buf());
    }

    /// Update configuration with CLI arguments
    pub fn update_with_cli(&mut self, cli: &Cli) {
        let root = cli
            .root
            .clone()
            .unwrap_or_else(|| self.get_root().to_owned());

        Self::update_option(&mut self.build.source, cli.source.as_ref());
        Self::update_option(&mut self.build.output, cli.output.as_ref());

        if cli.is_dev() {
            self.build.minify = false;
            self.build.purge = false;
        }

        self.config_path = normalize_path(&root.join(&cli.config));
        self.resolve_paths(&root);
    }

    /// Update config option if CLI value is provided
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    /// Make every filesystem path absolute against `root`.
    ///
    /// `vendor.output` stays relative to the output directory and
    /// `embed.data_dir` stays relative to the source directory.
    pub fn resolve_paths(&mut self, root: &Path) {
        let root = normalize_path(root);
        self.set_root(&root);

        self.build.source = normalize_path(&root.join(&self.build.source));
        self.build.output = normalize_path(&root.join(&self.build.output));
        self.build.vendor.entry = normalize_path(&root.join(&self.build.vendor.entry));
        self.audit.results_dir = normalize_path(&root.join(&self.audit.results_dir));
    }

    /// Validate configuration for the current command
    pub fn validate(&self) -> Result<()> {
        if self.build.source == self.build.output {
            bail!(ConfigError::Validation(
                "[build.output] must differ from [build.source]".into()
            ));
        }

        if self.build.source.starts_with(&self.build.output) {
            bail!(ConfigError::Validation(
                "[build.source] must not live inside [build.output]".into()
            ));
        }

        if self.watch.debounce_ms == 0 {
            bail!(ConfigError::Validation(
                "[watch.debounce_ms] must be greater than 0".into()
            ));
        }

        let vendor = &self.build.vendor;
        if vendor.enable && (vendor.output.as_os_str().is_empty() || vendor.output.is_absolute()) {
            bail!(ConfigError::Validation(
                "[build.vendor.output] must be a path relative to the output directory".into()
            ));
        }

        if self.audit.tool.is_empty() {
            bail!(ConfigError::Validation(
                "[audit.tool] must have at least one element".into()
            ));
        }

        if self.audit.timeout_secs == 0 {
            bail!(ConfigError::Validation(
                "[audit.timeout_secs] must be greater than 0".into()
            ));
        }

        for (name, assertion) in &self.audit.assertions {
            Self::validate_assertion(name, assertion)?;
        }

        Ok(())
    }

    fn validate_assertion(name: &str, assertion: &Assertion) -> Result<()> {
        if CATEGORY_METRICS.contains(&name) {
            match assertion.min_score {
                Some(score) if (0.0..=1.0).contains(&score) => Ok(()),
                Some(_) => bail!(ConfigError::Validation(format!(
                    "[audit.assertions.\"{name}\"] min_score must be within 0..=1"
                ))),
                None => bail!(ConfigError::Validation(format!(
                    "[audit.assertions.\"{name}\"] requires min_score"
                ))),
            }
        } else if TIMING_METRICS.contains(&name) {
            match assertion.max_numeric_value {
                Some(value) if value >= 0.0 => Ok(()),
                Some(_) => bail!(ConfigError::Validation(format!(
                    "[audit.assertions.\"{name}\"] max_numeric_value must not be negative"
                ))),
                None => bail!(ConfigError::Validation(format!(
                    "[audit.assertions.\"{name}\"] requires max_numeric_value"
                ))),
            }
        } else {
            bail!(ConfigError::Validation(format!(
                "[audit.assertions] unknown metric `{name}`"
            )))
        }
    }
}

/// Normalize a path to absolute, using canonicalize if the path exists
pub fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        }
    })
}

// ============================================================================
// Tests
// ============================================================================

//! `[audit]` section configuration.
//!
//! Pages to audit, how the static server and the audit tool are launched,
//! and the assertion table enforced on the collected reports.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::PathBuf, time::Duration};

/// Metric names accepted in `[audit.assertions]`.
pub const CATEGORY_METRICS: &[&str] = &[
    "categories:performance",
    "categories:accessibility",
    "categories:best-practices",
    "categories:seo",
];

/// Timing metrics read from the report's `audits` table.
pub const TIMING_METRICS: &[&str] = &[
    "first-contentful-paint",
    "largest-contentful-paint",
    "cumulative-layout-shift",
    "total-blocking-time",
];

/// `[audit]` section in sitepipe.toml.
///
/// # Example
/// ```toml
/// [audit]
/// pages = ["/", "/projects.html"]
/// timeout_secs = 90
///
/// [audit.assertions]
/// "categories:performance" = { level = "error", min_score = 0.9 }
/// "total-blocking-time" = { level = "warn", max_numeric_value = 300 }
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Page paths relative to the server root.
    #[serde(default = "defaults::audit::pages")]
    #[educe(Default = defaults::audit::pages())]
    pub pages: Vec<String>,

    /// Parent of the timestamped per-run report directories.
    #[serde(default = "defaults::audit::results_dir")]
    #[educe(Default = defaults::audit::results_dir())]
    pub results_dir: PathBuf,

    /// First port probed for the static server.
    #[serde(default = "defaults::audit::start_port")]
    #[educe(Default = defaults::audit::start_port())]
    pub start_port: u16,

    /// Delay between spawning the server and the liveness check.
    #[serde(default = "defaults::audit::settle_ms")]
    #[educe(Default = defaults::audit::settle_ms())]
    pub settle_ms: u64,

    /// Hard wall-clock limit for one page audit.
    #[serde(default = "defaults::audit::timeout_secs")]
    #[educe(Default = defaults::audit::timeout_secs())]
    pub timeout_secs: u64,

    /// Audit tool command (Lighthouse CLI compatible).
    #[serde(default = "defaults::audit::tool")]
    #[educe(Default = defaults::audit::tool())]
    pub tool: Vec<String>,

    /// Browser flags; `--user-data-dir` is appended per page.
    #[serde(default = "defaults::audit::chrome_flags")]
    #[educe(Default = defaults::audit::chrome_flags())]
    pub chrome_flags: Vec<String>,

    #[serde(default)]
    pub server: ServerConfig,

    /// Metric name → assertion. Replaces the default table when present.
    #[serde(default = "defaults::audit::assertions")]
    #[educe(Default = defaults::audit::assertions())]
    pub assertions: BTreeMap<String, Assertion>,
}

impl AuditConfig {
    pub const fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// `[audit.server]` section - the static file server process.
///
/// An empty `command` runs this executable's own `serve` subcommand.
/// In a custom command, `{port}` and `{dir}` are replaced with the probed
/// port and the output directory, e.g.
/// `["npx", "serve", "-s", "{dir}", "-l", "{port}"]`.
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default)]
    pub command: Vec<String>,

    /// Serve the root `index.html` for unknown paths.
    #[serde(default = "defaults::r#true")]
    #[educe(Default = true)]
    pub spa: bool,
}

/// Severity of an assertion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Not evaluated.
    Off,
    /// Advisory: reported, never fails the run.
    #[default]
    Warn,
    /// Blocking: fails the run.
    Error,
}

/// One threshold. Category metrics use `min_score` (0–1), timing metrics
/// use `max_numeric_value` (milliseconds, or unitless for layout shift).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Assertion {
    #[serde(default)]
    pub level: Level,

    #[serde(default)]
    pub min_score: Option<f64>,

    #[serde(default)]
    pub max_numeric_value: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::super::SiteConfig;
    use super::*;

    #[test]
    fn test_audit_defaults() {
        let config: SiteConfig = toml::from_str("").unwrap();
        let audit = &config.audit;

        assert_eq!(audit.pages, vec!["/"]);
        assert_eq!(audit.start_port, 3000);
        assert_eq!(audit.timeout(), Duration::from_secs(120));
        assert!(audit.server.spa);
        assert!(audit.server.command.is_empty());
        assert_eq!(audit.assertions.len(), 8);

        let perf = &audit.assertions["categories:performance"];
        assert_eq!(perf.level, Level::Error);
        assert_eq!(perf.min_score, Some(0.9));

        let cls = &audit.assertions["cumulative-layout-shift"];
        assert_eq!(cls.level, Level::Warn);
        assert_eq!(cls.max_numeric_value, Some(0.1));
    }

    #[test]
    fn test_assertions_table_replaces_defaults() {
        let config: SiteConfig = toml::from_str(
            r#"
            [audit.assertions]
            "categories:seo" = { level = "warn", min_score = 0.8 }
            "total-blocking-time" = { level = "off", max_numeric_value = 500 }
        "#,
        )
        .unwrap();

        let assertions = &config.audit.assertions;
        assert_eq!(assertions.len(), 2);
        assert_eq!(assertions["categories:seo"].level, Level::Warn);
        assert_eq!(assertions["total-blocking-time"].level, Level::Off);
        assert_eq!(assertions["total-blocking-time"].max_numeric_value, Some(500.0));
    }

    #[test]
    fn test_unknown_level_rejected() {
        let result: Result<SiteConfig, _> = toml::from_str(
            r#"
            [audit.assertions]
            "categories:seo" = { level = "fatal", min_score = 0.8 }
        "#,
        );
        assert!(result.is_err());
    }
}

//! Report parsing and threshold enforcement.
//!
//! Reads the subset of a Lighthouse JSON report the assertions need:
//! category scores (0–1, shown ×100) and the numeric values of the timing
//! audits.

use super::AuditError;
use crate::{
    config::{Assertion, CATEGORY_METRICS, Level, TIMING_METRICS},
    log,
};
use serde::Deserialize;
use std::{
    collections::BTreeMap,
    fmt, fs,
    path::{Path, PathBuf},
};

/// Absorbs float noise from the ×100 scaling (0.9 × 100 = 90.00000000000001).
const EPSILON: f64 = 1e-6;

// ============================================================================
// Report Format
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct Report {
    #[serde(rename = "runtimeError", default)]
    pub runtime_error: Option<RuntimeError>,

    #[serde(default)]
    categories: BTreeMap<String, Category>,

    #[serde(default)]
    audits: BTreeMap<String, AuditEntry>,
}

#[derive(Debug, Deserialize)]
pub struct RuntimeError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

#[derive(Debug, Deserialize)]
struct Category {
    #[serde(default)]
    score: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct AuditEntry {
    #[serde(rename = "numericValue", default)]
    numeric_value: Option<f64>,
}

impl Report {
    pub fn read(path: &Path) -> Result<Self, AuditError> {
        let invalid = |reason: String| AuditError::InvalidReport {
            path: path.to_path_buf(),
            reason,
        };
        let content = fs::read_to_string(path).map_err(|err| invalid(err.to_string()))?;
        serde_json::from_str(&content).map_err(|err| invalid(err.to_string()))
    }
}

// ============================================================================
// Page Results
// ============================================================================

/// The numbers extracted from one page's report.
#[derive(Debug, Clone, PartialEq)]
pub struct PageResult {
    pub page: String,
    pub report_path: PathBuf,
    /// Category name (without the `categories:` prefix) → score ×100.
    /// A category without a score counts as 0.
    pub categories: BTreeMap<String, f64>,
    /// Timing audit → numeric value. Absent when the report lacks it.
    pub metrics: BTreeMap<String, f64>,
}

impl PageResult {
    pub fn from_report(page: &str, report_path: &Path, report: &Report) -> Self {
        let categories = CATEGORY_METRICS
            .iter()
            .map(|metric| {
                let name = category_name(metric);
                let score = report
                    .categories
                    .get(name)
                    .and_then(|c| c.score)
                    .unwrap_or(0.0);
                (name.to_owned(), score * 100.0)
            })
            .collect();

        let metrics = TIMING_METRICS
            .iter()
            .filter_map(|metric| {
                let value = report.audits.get(*metric)?.numeric_value?;
                Some(((*metric).to_owned(), value))
            })
            .collect();

        Self {
            page: page.to_owned(),
            report_path: report_path.to_path_buf(),
            categories,
            metrics,
        }
    }

    /// One-line score summary for the log.
    pub fn summary(&self) -> String {
        let scores = self
            .categories
            .iter()
            .map(|(name, score)| format!("{name} {score:.0}"))
            .collect::<Vec<_>>()
            .join(", ");
        let timings = self
            .metrics
            .iter()
            .map(|(name, value)| format!("{} {}", metric_abbrev(name), format_metric(name, *value)))
            .collect::<Vec<_>>()
            .join(", ");

        if timings.is_empty() {
            format!("{}: {scores}", self.page)
        } else {
            format!("{}: {scores} | {timings}", self.page)
        }
    }
}

fn category_name(metric: &str) -> &str {
    metric.strip_prefix("categories:").unwrap_or(metric)
}

fn metric_abbrev(metric: &str) -> &str {
    match metric {
        "first-contentful-paint" => "FCP",
        "largest-contentful-paint" => "LCP",
        "cumulative-layout-shift" => "CLS",
        "total-blocking-time" => "TBT",
        other => other,
    }
}

fn format_metric(metric: &str, value: f64) -> String {
    if metric == "cumulative-layout-shift" {
        format!("{value:.3}")
    } else {
        format!("{value:.0}ms")
    }
}

// ============================================================================
// Evaluation
// ============================================================================

/// One failed threshold on one page.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub page: String,
    pub metric: String,
    pub actual: f64,
    pub limit: f64,
    pub level: Level,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.metric.starts_with("categories:") {
            write!(
                f,
                "{}: {} scored {:.0}, needs at least {:.0}",
                self.page,
                category_name(&self.metric),
                self.actual,
                self.limit
            )
        } else {
            write!(
                f,
                "{}: {} is {}, allowed at most {}",
                self.page,
                self.metric,
                format_metric(&self.metric, self.actual),
                format_metric(&self.metric, self.limit)
            )
        }
    }
}

/// Violations split by severity.
#[derive(Debug, Default)]
pub struct Evaluation {
    pub blocking: Vec<Violation>,
    pub advisory: Vec<Violation>,
}

impl Evaluation {
    pub fn passed(&self) -> bool {
        self.blocking.is_empty()
    }

    pub fn log(&self) {
        for violation in &self.advisory {
            log!("warn"; "{violation}");
        }
        for violation in &self.blocking {
            log!("error"; "{violation}");
        }
    }
}

/// Check every page against every assertion.
pub fn evaluate(results: &[PageResult], assertions: &BTreeMap<String, Assertion>) -> Evaluation {
    let mut evaluation = Evaluation::default();

    for result in results {
        for (metric, assertion) in assertions {
            let Some(violation) = check(result, metric, assertion) else {
                continue;
            };
            match assertion.level {
                Level::Error => evaluation.blocking.push(violation),
                Level::Warn => evaluation.advisory.push(violation),
                Level::Off => {}
            }
        }
    }

    evaluation
}

fn check(result: &PageResult, metric: &str, assertion: &Assertion) -> Option<Violation> {
    if assertion.level == Level::Off {
        return None;
    }

    let (actual, limit, failed) = if metric.starts_with("categories:") {
        let limit = assertion.min_score? * 100.0;
        let actual = result
            .categories
            .get(category_name(metric))
            .copied()
            .unwrap_or(0.0);
        (actual, limit, actual + EPSILON < limit)
    } else {
        let limit = assertion.max_numeric_value?;
        let actual = *result.metrics.get(metric)?;
        (actual, limit, actual > limit + EPSILON)
    };

    failed.then(|| Violation {
        page: result.page.clone(),
        metric: metric.to_owned(),
        actual,
        limit,
        level: assertion.level,
    })
}

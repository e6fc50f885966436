//! Default values for configuration fields.
//!
//! These functions are used by serde for default deserialization.

// ============================================================================
// Common Defaults
// ============================================================================

pub fn r#true() -> bool {
    true
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_owned()).collect()
}

// ============================================================================
// [build] Section Defaults
// ============================================================================

pub mod build {
    use std::path::PathBuf;

    pub fn root() -> Option<PathBuf> {
        None
    }

    pub fn source() -> PathBuf {
        ".".into()
    }

    pub fn output() -> PathBuf {
        "dist".into()
    }

    pub fn exclude() -> Vec<String> {
        super::strings(&[
            "dist/**",
            "node_modules/**",
            ".git/**",
            "target/**",
            "lighthouse-results/**",
            "**/*.min.js",
            "**/*.min.css",
        ])
    }

    pub mod patterns {
        pub fn markup() -> Vec<String> {
            super::super::strings(&["**/*.html"])
        }

        pub fn styles() -> Vec<String> {
            super::super::strings(&["**/*.css"])
        }

        pub fn scripts() -> Vec<String> {
            super::super::strings(&["**/*.js"])
        }

        pub fn images() -> Vec<String> {
            super::super::strings(&[
                "**/*.png",
                "**/*.jpg",
                "**/*.jpeg",
                "**/*.gif",
                "**/*.svg",
                "**/*.webp",
                "**/*.avif",
                "**/*.ico",
            ])
        }

        pub fn verbatim() -> Vec<String> {
            super::super::strings(&[
                "robots.txt",
                "sitemap.xml",
                "CNAME",
                "site.webmanifest",
                "data/**",
                "**/*.pdf",
                "**/*.woff",
                "**/*.woff2",
            ])
        }
    }

    pub mod vendor {
        use std::path::PathBuf;

        pub fn name() -> String {
            "chart.js".into()
        }

        pub fn entry() -> PathBuf {
            "node_modules/chart.js/dist/chart.umd.js".into()
        }

        pub fn output() -> PathBuf {
            "js/vendor/chart.umd.min.js".into()
        }
    }

    pub mod embed {
        use std::path::PathBuf;

        pub fn page() -> String {
            "index.html".into()
        }

        pub fn data_dir() -> PathBuf {
            "data".into()
        }

        pub fn json() -> String {
            "dashboard.json".into()
        }

        pub fn csv() -> String {
            "results.csv".into()
        }
    }
}

// ============================================================================
// [watch] Section Defaults
// ============================================================================

pub mod watch {
    pub fn debounce_ms() -> u64 {
        300
    }
}

// ============================================================================
// [audit] Section Defaults
// ============================================================================

pub mod audit {
    use crate::config::{Assertion, Level};
    use std::{collections::BTreeMap, path::PathBuf};

    pub fn pages() -> Vec<String> {
        super::strings(&["/"])
    }

    pub fn results_dir() -> PathBuf {
        "lighthouse-results".into()
    }

    pub fn start_port() -> u16 {
        3000
    }

    pub fn settle_ms() -> u64 {
        2000
    }

    pub fn timeout_secs() -> u64 {
        120
    }

    pub fn tool() -> Vec<String> {
        super::strings(&["lighthouse"])
    }

    pub fn chrome_flags() -> Vec<String> {
        super::strings(&[
            "--headless=new",
            "--no-sandbox",
            "--disable-gpu",
            "--disable-dev-shm-usage",
        ])
    }

    pub fn assertions() -> BTreeMap<String, Assertion> {
        let min = |score| Assertion {
            level: Level::Error,
            min_score: Some(score),
            max_numeric_value: None,
        };
        let max = |value| Assertion {
            level: Level::Warn,
            min_score: None,
            max_numeric_value: Some(value),
        };

        BTreeMap::from([
            ("categories:performance".into(), min(0.9)),
            ("categories:accessibility".into(), min(0.9)),
            ("categories:best-practices".into(), min(0.9)),
            ("categories:seo".into(), min(0.9)),
            ("first-contentful-paint".into(), max(2000.0)),
            ("largest-contentful-paint".into(), max(2500.0)),
            ("cumulative-layout-shift".into(), max(0.1)),
            ("total-blocking-time".into(), max(300.0)),
        ])
    }
}

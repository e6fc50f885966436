//! Glob pattern sets with git wildmatch semantics.
//!
//! Patterns are matched against `/`-separated paths relative to the source
//! root. `*` never crosses a `/`; `**` does, and `**/` also matches zero
//! directories, so `**/*.html` matches both `index.html` and
//! `blog/post.html`.

use gix::{
    bstr::{BString, ByteSlice},
    glob::wildmatch,
};
use std::path::Path;

/// An ordered list of patterns; a path matches the set when any pattern
/// matches it.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<BString>,
}

impl PatternSet {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        let patterns = patterns
            .iter()
            .map(|p| p.as_ref().trim())
            .filter(|p| !p.is_empty())
            .map(|p| BString::from(p.trim_start_matches("./")))
            .collect();
        Self { patterns }
    }

    /// Check a relative, `/`-separated path against every pattern.
    pub fn matches(&self, rel: &str) -> bool {
        self.patterns.iter().any(|pattern| {
            wildmatch(
                pattern.as_bstr(),
                rel.into(),
                wildmatch::Mode::NO_MATCH_SLASH_LITERAL,
            )
        })
    }
}

/// Convert `path` to a `/`-separated string relative to `root`.
///
/// Returns `None` for paths outside `root` or with non-UTF-8 components.
pub fn relative_slash_path(path: &Path, root: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Option<Vec<&str>> = rel.components().map(|c| c.as_os_str().to_str()).collect();
    let joined = parts?.join("/");
    (!joined.is_empty()).then_some(joined)
}

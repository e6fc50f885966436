//! Unused-rule removal for stylesheets.
//!
//! Every identifier-like token (`[A-Za-z0-9_-]+`) found in markup and
//! scripts counts as "used". A style rule survives when at least one of its
//! selectors references only used (or safelisted) class and id names.
//! Selectors without class or id names, such as `body` or `a:hover`, are
//! always kept.
//!
//! Conditional group rules (`@media`, `@supports`, `@layer`, `@container`)
//! are purged recursively and dropped once empty. Every other at-rule
//! (`@font-face`, `@keyframes`, `@import`, ...) is kept verbatim.

use super::minify::TransformError;
use regex::Regex;
use rustc_hash::FxHashSet;
use std::{fmt::Write, sync::OnceLock};

const CONDITIONAL_AT_RULES: &[&str] = &["media", "supports", "layer", "container"];

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z0-9_-]+").unwrap())
}

fn selector_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.#](-?[A-Za-z_][A-Za-z0-9_-]*)").unwrap())
}

fn comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)/\*.*?\*/").unwrap())
}

/// Collected usage tokens plus the configured safelist.
#[derive(Debug, Default)]
pub struct Purger {
    used: FxHashSet<String>,
    safelist: FxHashSet<String>,
}

impl Purger {
    pub fn new<S: AsRef<str>>(safelist: &[S]) -> Self {
        let safelist = safelist
            .iter()
            .map(|name| name.as_ref().trim().trim_start_matches(['.', '#']).to_owned())
            .filter(|name| !name.is_empty())
            .collect();
        Self {
            used: FxHashSet::default(),
            safelist,
        }
    }

    /// Record every token of a markup or script source as used.
    pub fn scan(&mut self, content: &str) {
        for token in token_re().find_iter(content) {
            if !self.used.contains(token.as_str()) {
                self.used.insert(token.as_str().to_owned());
            }
        }
    }

    pub fn token_count(&self) -> usize {
        self.used.len()
    }

    /// Remove unused rules from `css`.
    ///
    /// Fails on unbalanced braces; the caller keeps the original then.
    pub fn purge(&self, css: &str) -> Result<String, TransformError> {
        let mut out = String::with_capacity(css.len());
        self.purge_block(css, &mut out)?;
        Ok(out)
    }

    fn purge_block(&self, css: &str, out: &mut String) -> Result<(), TransformError> {
        let mut rest = css;

        while let Some((idx, delim)) = find_delimiter(rest) {
            match delim {
                b'}' => return Err(TransformError::Purge("unexpected `}`".into())),
                b';' => {
                    let statement = strip_comments(&rest[..=idx]);
                    if statement.len() > 1 {
                        let _ = writeln!(out, "{statement}");
                    }
                    rest = &rest[idx + 1..];
                }
                _ => {
                    let close = matching_brace(rest, idx)
                        .ok_or_else(|| TransformError::Purge("unclosed `{`".into()))?;
                    let prelude = strip_comments(&rest[..idx]);
                    let body = &rest[idx + 1..close];
                    rest = &rest[close + 1..];

                    if let Some(at_rule) = prelude.strip_prefix('@') {
                        if is_conditional(at_rule) {
                            let mut inner = String::new();
                            self.purge_block(body, &mut inner)?;
                            if !inner.is_empty() {
                                let _ = write!(out, "{prelude}{{\n{inner}}}\n");
                            }
                        } else {
                            let _ = writeln!(out, "{prelude}{{{body}}}");
                        }
                    } else if self.keeps(&prelude) {
                        let _ = writeln!(out, "{prelude}{{{}}}", body.trim());
                    }
                }
            }
        }

        if !strip_comments(rest).is_empty() {
            return Err(TransformError::Purge("unterminated rule at end of input".into()));
        }
        Ok(())
    }

    fn is_used(&self, name: &str) -> bool {
        self.used.contains(name) || self.safelist.contains(name)
    }

    /// A selector list is kept when any one of its selectors is kept.
    fn keeps(&self, selectors: &str) -> bool {
        split_top_level(selectors).into_iter().any(|selector| {
            let bare = strip_groups(selector);
            selector_name_re()
                .captures_iter(&bare)
                .all(|caps| self.is_used(&caps[1]))
        })
    }
}

fn is_conditional(at_rule: &str) -> bool {
    let name = at_rule
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or_default();
    CONDITIONAL_AT_RULES
        .iter()
        .any(|known| known.eq_ignore_ascii_case(name))
}

fn strip_comments(text: &str) -> String {
    comment_re().replace_all(text, "").trim().to_owned()
}

/// Walk `css` calling `visit` on each `{`, `}` and `;` outside strings and
/// comments; stops at the first index for which `visit` returns true.
fn scan_structural(css: &str, from: usize, mut visit: impl FnMut(u8) -> bool) -> Option<usize> {
    let bytes = css.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = from;

    while i < bytes.len() {
        let byte = bytes[i];
        match quote {
            Some(_) if byte == b'\\' => i += 1,
            Some(q) if byte == q => quote = None,
            Some(_) => {}
            None => match byte {
                b'"' | b'\'' => quote = Some(byte),
                b'/' if bytes.get(i + 1) == Some(&b'*') => {
                    i = css[i + 2..].find("*/").map_or(bytes.len(), |end| i + 2 + end + 2);
                    continue;
                }
                b'{' | b'}' | b';' if visit(byte) => return Some(i),
                _ => {}
            },
        }
        i += 1;
    }
    None
}

fn find_delimiter(css: &str) -> Option<(usize, u8)> {
    scan_structural(css, 0, |_| true).map(|idx| (idx, css.as_bytes()[idx]))
}

/// Index of the `}` closing the block opened at `open`.
fn matching_brace(css: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    scan_structural(css, open, |byte| match byte {
        b'{' => {
            depth += 1;
            false
        }
        b'}' => {
            depth = depth.saturating_sub(1);
            depth == 0
        }
        _ => false,
    })
}

/// Split a selector list on commas outside parentheses and brackets.
fn split_top_level(selectors: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;

    for (i, ch) in selectors.char_indices() {
        match ch {
            '(' | '[' => depth += 1,
            ')' | ']' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(selectors[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(selectors[start..].trim());
    parts.retain(|part| !part.is_empty());
    parts
}

/// Drop attribute selectors and pseudo-class arguments, which never name
/// classes that must be present.
fn strip_groups(selector: &str) -> String {
    let mut bare = String::with_capacity(selector.len());
    let mut depth = 0i32;

    for ch in selector.chars() {
        match ch {
            '(' | '[' => depth += 1,
            ')' | ']' => depth -= 1,
            _ if depth == 0 => bare.push(ch),
            _ => {}
        }
    }
    bare
}

#[cfg(test)]
mod tests {
    use super::*;

    fn purger(markup: &str) -> Purger {
        let mut purger = Purger::new::<&str>(&[]);
        purger.scan(markup);
        purger
    }

    #[test]
    fn test_unused_rules_removed() {
        let purger = purger(r#"<div class="card"><p id="intro">Hi</p></div>"#);
        let css = ".card { color: red; }\n.unused { color: blue; }\n#intro { margin: 0; }";

        let result = purger.purge(css).unwrap();
        assert!(result.contains(".card{color: red;}"));
        assert!(result.contains("#intro{margin: 0;}"));
        assert!(!result.contains(".unused"));
    }

    #[test]
    fn test_selector_lists_and_compounds() {
        let purger = purger(r#"<button class="btn">Go</button>"#);

        let result = purger.purge(".btn, .ghost { padding: 0 }").unwrap();
        assert!(result.contains(".btn, .ghost"));

        let result = purger.purge(".btn.active { color: red }").unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_element_and_pseudo_selectors_kept() {
        let purger = purger("<a href='/'>home</a>");
        let css = "body { margin: 0 }\na:hover { color: red }\ninput[type=\"text\"] { border: 0 }";

        let result = purger.purge(css).unwrap();
        assert!(result.contains("body{margin: 0}"));
        assert!(result.contains("a:hover"));
        assert!(result.contains("input[type=\"text\"]"));
    }

    #[test]
    fn test_media_blocks_purged_recursively() {
        let purger = purger(r#"<nav class="menu"></nav>"#);
        let css = "@media (max-width: 600px) { .menu { display: none } .gone { color: red } }\n\
                   @media print { .gone { display: none } }";

        let result = purger.purge(css).unwrap();
        assert!(result.contains("@media (max-width: 600px){"));
        assert!(result.contains(".menu{display: none}"));
        assert!(!result.contains(".gone"));
        assert!(!result.contains("@media print"));
    }

    #[test]
    fn test_other_at_rules_kept() {
        let purger = purger("");
        let css = "@charset \"utf-8\";\n\
                   @font-face { font-family: Inter; src: url(inter.woff2); }\n\
                   @keyframes spin { from { transform: rotate(0) } to { transform: rotate(1turn) } }";

        let result = purger.purge(css).unwrap();
        assert!(result.contains("@charset \"utf-8\";"));
        assert!(result.contains("@font-face{"));
        assert!(result.contains("@keyframes spin{"));
        assert!(result.contains("rotate(1turn)"));
    }

    #[test]
    fn test_tokens_from_scripts_and_safelist() {
        let mut purger = Purger::new(&[".is-dark"]);
        purger.scan("menu.classList.toggle('is-open');");

        let css = ".is-open { display: block }\n.is-dark { color: white }\n.never { color: red }";
        let result = purger.purge(css).unwrap();

        assert!(result.contains(".is-open"));
        assert!(result.contains(".is-dark"));
        assert!(!result.contains(".never"));
    }

    #[test]
    fn test_comments_and_strings_ignored() {
        let purger = purger(r#"<p class="note"></p>"#);
        let css = "/* { not a block */ .note::before { content: \"}\"; }";

        let result = purger.purge(css).unwrap();
        assert!(result.contains(".note::before{content: \"}\";}"));
    }

    #[test]
    fn test_unbalanced_braces_fail() {
        let purger = purger(r#"<p class="note"></p>"#);

        assert!(purger.purge(".note { color: red;").is_err());
        assert!(purger.purge(".note { color: red; } }").is_err());
    }

    #[test]
    fn test_scan_collects_tokens() {
        let purger = purger("<div class=\"grid grid-cols-2\">x_y</div>");
        assert!(purger.is_used("grid"));
        assert!(purger.is_used("grid-cols-2"));
        assert!(purger.is_used("x_y"));
        assert!(!purger.is_used("flex"));
        assert!(purger.token_count() >= 4);
    }
}

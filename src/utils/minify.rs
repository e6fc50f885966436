//! Minification for markup, stylesheets and scripts.
//!
//! Markup minification never fails. Stylesheet and script minification
//! report a [`TransformError`] so the caller can fall back to the original
//! source for that one file.

use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use minify_js::{Session, TopLevelMode};
use thiserror::Error;

/// A per-file transformation failure. Never aborts a build on its own.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("stylesheet: {0}")]
    Style(String),

    #[error("script: {0}")]
    Script(String),

    #[error("purge: {0}")]
    Purge(String),

    #[error("vendor bundle: {0}")]
    Vendor(String),
}

/// Minify HTML, including inline `<style>` and `<script>` content.
pub fn minify_html(html: &[u8]) -> Vec<u8> {
    let mut cfg = minify_html::Cfg::new();
    cfg.keep_closing_tags = true;
    cfg.keep_html_and_head_opening_tags = true;
    cfg.keep_comments = false;
    cfg.minify_css = true;
    cfg.minify_js = true;
    cfg.remove_bangs = true;
    cfg.remove_processing_instructions = true;
    minify_html::minify(html, &cfg)
}

/// Parse, optimize and print a stylesheet without whitespace.
pub fn minify_css(css: &str) -> Result<String, TransformError> {
    let mut sheet = StyleSheet::parse(css, ParserOptions::default())
        .map_err(|err| TransformError::Style(err.to_string()))?;

    sheet
        .minify(MinifyOptions::default())
        .map_err(|err| TransformError::Style(err.to_string()))?;

    let printed = sheet
        .to_css(PrinterOptions {
            minify: true,
            ..PrinterOptions::default()
        })
        .map_err(|err| TransformError::Style(err.to_string()))?;

    Ok(printed.code)
}

/// Minify a classic (non-module) script.
pub fn minify_js(source: &[u8]) -> Result<Vec<u8>, TransformError> {
    let session = Session::new();
    let mut out = Vec::with_capacity(source.len());
    minify_js::minify(&session, TopLevelMode::Global, source, &mut out)
        .map_err(|err| TransformError::Script(format!("{err:?}")))?;
    Ok(out)
}

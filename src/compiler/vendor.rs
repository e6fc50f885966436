//! Vendor chart bundle.
//!
//! Best-effort: every failure is returned as a [`TransformError`] which the
//! build logs as a warning before carrying on without the bundle.

use crate::{
    config::BuildConfig,
    exec, log,
    utils::{
        fs::write_file,
        minify::{TransformError, minify_js},
    },
};
use std::{fs, path::Path};

/// Produce the vendor bundle under the output directory.
///
/// Returns the bundle size in bytes.
pub fn bundle_vendor(config: &BuildConfig) -> Result<u64, TransformError> {
    let vendor = &config.vendor;
    let dest = config.output.join(&vendor.output);

    if vendor.command.is_empty() {
        copy_entry(&vendor.entry, &dest, config.minify)
    } else {
        let root = config.root.as_deref().unwrap_or(Path::new("./"));
        run_bundler(root, &vendor.command, &vendor.entry, &dest)
    }
}

/// Minify the prebuilt entry file in-process.
fn copy_entry(entry: &Path, dest: &Path, minify: bool) -> Result<u64, TransformError> {
    let source = fs::read(entry)
        .map_err(|err| TransformError::Vendor(format!("{}: {err}", entry.display())))?;

    let bytes = if minify {
        minify_js(&source).unwrap_or_else(|err| {
            log!("warn"; "{}: {err}, copied unminified", entry.display());
            source.clone()
        })
    } else {
        source
    };

    write_file(dest, &bytes)
        .map_err(|err| TransformError::Vendor(format!("{}: {err}", dest.display())))?;
    Ok(bytes.len() as u64)
}

/// Run the external bundler with `<entry> <dest>` appended.
fn run_bundler(
    root: &Path,
    command: &[String],
    entry: &Path,
    dest: &Path,
) -> Result<u64, TransformError> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| TransformError::Vendor(format!("{}: {err}", parent.display())))?;
    }

    exec!(root; command; entry, dest).map_err(|err| TransformError::Vendor(format!("{err:#}")))?;

    fs::metadata(dest).map(|m| m.len()).map_err(|_| {
        TransformError::Vendor(format!("bundler wrote nothing to {}", dest.display()))
    })
}

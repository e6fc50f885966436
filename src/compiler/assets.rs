use super::{Processed, SourceFile};
use crate::utils::fs::copy_file;
use anyhow::{Context, Result};
use std::path::Path;

/// Copy an image or verbatim file unchanged, preserving its relative path.
pub fn copy_asset(file: &SourceFile, output: &Path) -> Result<Processed> {
    let bytes = copy_file(&file.path, &file.dest(output))
        .with_context(|| format!("Failed to copy {}", file.rel))?;
    Ok(Processed::copied(bytes))
}

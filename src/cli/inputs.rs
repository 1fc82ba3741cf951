//! Input discovery for batch runs

use crate::services::ImageIOService;
use anyhow::{Context, Result};
use log::warn;
use std::path::{Path, PathBuf};

/// Expand files and directories into a sorted list of supported images
///
/// Explicit files are kept even when their extension is unknown so that the
/// codec reports the failure for that item. Directory contents are filtered
/// by extension and the optional file-name glob.
pub(crate) fn discover_inputs(
    inputs: &[PathBuf],
    recursive: bool,
    pattern: Option<&str>,
) -> Result<Vec<PathBuf>> {
    let pattern = pattern
        .map(glob::Pattern::new)
        .transpose()
        .context("Invalid --pattern glob")?;

    let mut files = Vec::new();
    for input in inputs {
        if input.is_file() {
            if !ImageIOService::is_supported_format(input) {
                warn!("{} has an unrecognized extension; trying anyway", input.display());
            }
            files.push(input.clone());
        } else if input.is_dir() {
            let mut found = find_image_files(input, recursive, pattern.as_ref())?;
            found.sort();
            files.extend(found);
        } else {
            anyhow::bail!(
                "Input path does not exist or is not accessible: {}",
                input.display()
            );
        }
    }
    Ok(files)
}

fn find_image_files(
    dir: &Path,
    recursive: bool,
    pattern: Option<&glob::Pattern>,
) -> Result<Vec<PathBuf>> {
    let walker = walkdir::WalkDir::new(dir)
        .min_depth(1)
        .max_depth(if recursive { usize::MAX } else { 1 });

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to read {}", dir.display()))?;
        let path = entry.path();
        if entry.file_type().is_file()
            && ImageIOService::is_supported_format(path)
            && matches_pattern(path, pattern)
        {
            files.push(path.to_path_buf());
        }
    }
    Ok(files)
}

fn matches_pattern(path: &Path, pattern: Option<&glob::Pattern>) -> bool {
    match pattern {
        Some(pattern) => path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| pattern.matches(name)),
        None => true,
    }
}

//! Resolves the on-disk template file for a request from SCGI header metadata.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::LocatorError;

const DEFAULT_TEMPLATE: &str = "index.tcl";

/// Tries, in order, `DOCUMENT_URI`, `SCRIPT_NAME`, `PATH_INFO` (each with a leading `/`
/// stripped), then the literal `index.tcl`, against `base`. Returns the first candidate
/// that is an existing, regular, readable file.
pub async fn locate(
    base: &Path,
    headers: &HashMap<String, String>,
) -> Result<PathBuf, LocatorError> {
    let candidates = [
        headers.get("DOCUMENT_URI"),
        headers.get("SCRIPT_NAME"),
        headers.get("PATH_INFO"),
    ];

    let mut last = String::new();
    for candidate in candidates.into_iter().flatten() {
        let suffix = candidate.trim_start_matches('/');
        if suffix.is_empty() {
            continue;
        }
        let path = base.join(suffix);
        last = path.display().to_string();
        if is_readable_file(&path).await {
            return Ok(path);
        }
    }

    let fallback = base.join(DEFAULT_TEMPLATE);
    last = fallback.display().to_string();
    if is_readable_file(&fallback).await {
        return Ok(fallback);
    }

    Err(LocatorError::NotFound(last))
}

/// The configured base directory for template resolution: the CLI `--path` override if
/// non-empty, else the request's `DOCUMENT_ROOT`.
pub fn base_dir(configured_path: &str, headers: &HashMap<String, String>) -> PathBuf {
    if !configured_path.is_empty() {
        PathBuf::from(configured_path)
    } else {
        PathBuf::from(headers.get("DOCUMENT_ROOT").map(String::as_str).unwrap_or(""))
    }
}

async fn is_readable_file(path: &Path) -> bool {
    match tokio::fs::metadata(path).await {
        Ok(meta) => meta.is_file(),
        Err(_) => false,
    }
}

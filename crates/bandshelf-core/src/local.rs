//! Local-file candidate discovery.
//!
//! Locally selected files enter the same import pipeline as remote ones;
//! this module turns a folder on disk into a list of import candidates,
//! keeping only supported audio files.

use std::path::Path;

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::Result;
use crate::format::is_audio_file;
use crate::import::ImportCandidate;

/// Discover importable audio files under a directory.
///
/// Walks the directory (recursively when `recursive` is set), keeps files
/// with a supported audio extension, and returns candidates sorted
/// case-insensitively by display name. Unreadable entries are skipped with
/// a warning rather than failing the scan.
///
/// # Errors
///
/// Returns an error if the root directory itself cannot be read.
pub fn discover_local_candidates(dir: &Path, recursive: bool) -> Result<Vec<ImportCandidate>> {
    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut candidates = Vec::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(max_depth) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                // An unreadable root is fatal; anything deeper is skipped.
                if e.path() == Some(dir) || e.depth() == 0 {
                    return Err(std::io::Error::from(e).into());
                }
                warn!("Skipping unreadable entry during scan: {}", e);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy();
        if !is_audio_file(&name) {
            debug!("Skipping non-audio file: {}", name);
            continue;
        }

        let size_bytes = entry.metadata().map(|m| m.len()).unwrap_or(0);
        candidates.push(ImportCandidate::local(entry.into_path(), size_bytes));
    }

    candidates.sort_by(|a, b| {
        a.display_name
            .to_lowercase()
            .cmp(&b.display_name.to_lowercase())
    });

    Ok(candidates)
}

//! File selection by naming pattern.

use std::path::{Path, PathBuf};

use crate::Result;
use crate::pipeline::naming::NamingPattern;
use crate::utils::fs::io_error;

/// A matched file and the size observed when it was listed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub path: PathBuf,
    pub size: u64,
}

/// List the regular files directly under `dir` that `pattern` matches.
///
/// Only names produced under `pattern` are returned, never "everything in the
/// directory". Playlist items are ordered by their numeric index, anything
/// else by filename. An empty result is valid and
/// means nothing was produced.
pub async fn select(dir: &Path, pattern: &NamingPattern) -> Result<Vec<SelectedFile>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| io_error("reading directory", dir, e))?;

    let mut selected = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| io_error("reading directory", dir, e))?
    {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !pattern.matches(name) {
            continue;
        }

        // A file can vanish between listing and stat; skip it.
        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }

        selected.push(SelectedFile {
            path: entry.path(),
            size: metadata.len(),
        });
    }

    if pattern.is_indexed() {
        // Numeric, so `100 - x` lands after `99 - x` despite the 2-digit padding
        selected.sort_by_cached_key(|f| {
            let name = f.path.file_name().map(|n| n.to_string_lossy().into_owned());
            (name.as_deref().and_then(|n| pattern.index_of(n)), name)
        });
    } else {
        selected.sort_by(|a, b| a.path.file_name().cmp(&b.path.file_name()));
    }
    Ok(selected)
}

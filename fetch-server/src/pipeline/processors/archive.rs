//! Zip archiver.
//!
//! Entries are streamed from disk into the archive one at a time, so memory
//! use does not depend on artifact size. The archive is written beside its
//! destination under a `.part` name and only renamed into place once it is
//! complete; on error the partial file is removed.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::utils::fs::remove_file_if_exists_sync;
use crate::{Error, Result};

/// Entries at or above this size need zip64 headers.
const ZIP64_THRESHOLD: u64 = 0xFFFF_FFFF;

/// A file to add and the name it gets inside the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub path: PathBuf,
    pub name: String,
}

impl ArchiveEntry {
    pub fn new(path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveStats {
    pub entries: usize,
    pub input_bytes: u64,
    pub output_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct Archiver {
    compression_level: u8,
}

impl Default for Archiver {
    fn default() -> Self {
        Self::new(9)
    }
}

impl Archiver {
    /// `compression_level` is a deflate level; 0 stores entries uncompressed.
    pub fn new(compression_level: u8) -> Self {
        Self {
            compression_level: compression_level.min(9),
        }
    }

    /// Where the archive for `destination` is written until it is complete.
    pub fn partial_path(destination: &Path) -> PathBuf {
        let mut name = destination.as_os_str().to_owned();
        name.push(".part");
        PathBuf::from(name)
    }

    /// Archive `entries` into `destination`.
    pub async fn archive(&self, entries: Vec<ArchiveEntry>, destination: &Path) -> Result<ArchiveStats> {
        if entries.is_empty() {
            return Err(Error::Archive("No input files to archive".to_string()));
        }

        let level = self.compression_level;
        let destination = destination.to_path_buf();
        let partial = Self::partial_path(&destination);
        let start = std::time::Instant::now();

        let stats = tokio::task::spawn_blocking(move || {
            let result = write_zip(&entries, &partial, level).and_then(|stats| {
                std::fs::rename(&partial, &destination).map_err(|e| {
                    Error::Archive(format!(
                        "Failed to move archive into place at {}: {}",
                        destination.display(),
                        e
                    ))
                })?;
                Ok(stats)
            });
            if result.is_err() {
                let _ = remove_file_if_exists_sync(&partial);
            }
            result
        })
        .await
        .map_err(|e| Error::Archive(format!("Archive task failed: {}", e)))??;

        info!(
            entries = stats.entries,
            input_bytes = stats.input_bytes,
            output_bytes = stats.output_bytes,
            elapsed = ?start.elapsed(),
            "Archive created"
        );
        Ok(stats)
    }
}

fn write_zip(entries: &[ArchiveEntry], output: &Path, level: u8) -> Result<ArchiveStats> {
    let file = File::create(output).map_err(|e| {
        Error::Archive(format!("Failed to create archive {}: {}", output.display(), e))
    })?;
    let mut zip = ZipWriter::new(BufWriter::new(file));

    let base = if level == 0 {
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored)
    } else {
        SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .compression_level(Some(i64::from(level)))
    };

    let mut input_bytes = 0u64;
    for entry in entries {
        let mut input = File::open(&entry.path).map_err(|e| {
            Error::Archive(format!(
                "Failed to open input file {}: {}",
                entry.path.display(),
                e
            ))
        })?;
        let size = input
            .metadata()
            .map_err(|e| Error::Archive(format!("Failed to get file metadata: {}", e)))?
            .len();

        let options = base.large_file(size >= ZIP64_THRESHOLD);
        debug!(path = %entry.path.display(), name = %entry.name, size, "Adding to ZIP");

        zip.start_file(entry.name.as_str(), options)
            .map_err(|e| Error::Archive(format!("Failed to start ZIP entry {}: {}", entry.name, e)))?;
        let copied = std::io::copy(&mut input, &mut zip).map_err(|e| {
            Error::Archive(format!("Failed to write {} to archive: {}", entry.name, e))
        })?;
        input_bytes += copied;
    }

    let mut writer = zip
        .finish()
        .map_err(|e| Error::Archive(format!("Failed to finalize ZIP archive: {}", e)))?;
    writer
        .flush()
        .map_err(|e| Error::Archive(format!("Failed to flush archive: {}", e)))?;
    drop(writer);

    let output_bytes = std::fs::metadata(output).map(|m| m.len()).unwrap_or(0);
    Ok(ArchiveStats {
        entries: entries.len(),
        input_bytes,
        output_bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    fn read_entries(path: &Path) -> Vec<(String, Vec<u8>)> {
        let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
        (0..archive.len())
            .map(|i| {
                let mut entry = archive.by_index(i).unwrap();
                let mut data = Vec::new();
                entry.read_to_end(&mut data).unwrap();
                (entry.name().to_string(), data)
            })
            .collect()
    }

    #[tokio::test]
    async fn test_round_trip_preserves_names_and_bytes() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("job__01 - Intro.mp4");
        let second = dir.path().join("job__02 - Café.webm");
        std::fs::write(&first, b"first file bytes").unwrap();
        let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&second, &payload).unwrap();

        let dest = dir.path().join("Playlist-20240101.zip");
        let stats = Archiver::default()
            .archive(
                vec![
                    ArchiveEntry::new(&first, "01 - Intro.mp4"),
                    ArchiveEntry::new(&second, "02 - Café.webm"),
                ],
                &dest,
            )
            .await
            .unwrap();

        assert_eq!(stats.entries, 2);
        assert_eq!(stats.input_bytes, 16 + 200_000);
        assert!(!Archiver::partial_path(&dest).exists());
        assert_eq!(
            read_entries(&dest),
            vec![
                ("01 - Intro.mp4".to_string(), b"first file bytes".to_vec()),
                ("02 - Café.webm".to_string(), payload),
            ]
        );
    }

    #[tokio::test]
    async fn test_stored_level() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("a.mp4");
        std::fs::write(&input, b"abc").unwrap();
        let dest = dir.path().join("out.zip");

        Archiver::new(0)
            .archive(vec![ArchiveEntry::new(&input, "a.mp4")], &dest)
            .await
            .unwrap();

        assert_eq!(read_entries(&dest), vec![("a.mp4".to_string(), b"abc".to_vec())]);
    }

    #[tokio::test]
    async fn test_empty_input_is_rejected() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("out.zip");
        let err = Archiver::default().archive(Vec::new(), &dest).await.unwrap_err();
        assert_eq!(err.kind(), "ArchiveError");
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_missing_input_leaves_no_partial_archive() {
        let dir = TempDir::new().unwrap();
        let present = dir.path().join("a.mp4");
        std::fs::write(&present, b"a").unwrap();
        let dest = dir.path().join("out.zip");

        let err = Archiver::default()
            .archive(
                vec![
                    ArchiveEntry::new(&present, "a.mp4"),
                    ArchiveEntry::new(dir.path().join("missing.mp4"), "b.mp4"),
                ],
                &dest,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Archive(_)));
        assert!(!dest.exists());
        assert!(!Archiver::partial_path(&dest).exists());
    }
}

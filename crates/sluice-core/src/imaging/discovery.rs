//! File discovery for finding images in directories.
//!
//! Only the top level of a directory is scanned; subdirectories are skipped.
//! Scanning is lazy: [`FileDiscovery::scan`] returns an iterator that reads
//! the directory as it is consumed, so a source stage can start emitting
//! files before the listing has finished.

use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::ProcessingConfig;

/// Discovers image files in directories.
#[derive(Debug, Clone)]
pub struct FileDiscovery {
    config: ProcessingConfig,
}

/// Information about a discovered file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    /// Full path to the file
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
}

impl DiscoveredFile {
    /// Final path component, lossily converted.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

impl FileDiscovery {
    /// Create a new file discovery instance.
    pub fn new(config: ProcessingConfig) -> Self {
        Self { config }
    }

    /// List `root` lazily, yielding its supported files in file-name order.
    /// Unreadable entries are logged and skipped.
    pub fn scan(&self, root: &Path) -> Scan {
        let walker = WalkDir::new(root)
            .max_depth(1)
            .follow_links(self.config.follow_links)
            .sort_by_file_name()
            .into_iter();
        Scan {
            walker,
            formats: self
                .config
                .supported_formats
                .iter()
                .map(|f| f.to_lowercase())
                .collect(),
        }
    }
}

fn has_supported_extension(path: &Path, formats: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext_lower = ext.to_lowercase();
            formats.iter().any(|fmt| fmt.to_lowercase() == ext_lower)
        })
        .unwrap_or(false)
}

/// Lazy directory walk returned by [`FileDiscovery::scan`].
pub struct Scan {
    walker: walkdir::IntoIter,
    formats: Vec<String>,
}

impl Iterator for Scan {
    type Item = DiscoveredFile;

    fn next(&mut self) -> Option<DiscoveredFile> {
        for entry in self.walker.by_ref() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if !has_supported_extension(entry.path(), &self.formats) {
                continue;
            }
            match entry.metadata() {
                Ok(meta) => {
                    return Some(DiscoveredFile {
                        path: entry.into_path(),
                        size: meta.len(),
                    })
                }
                Err(e) => tracing::warn!("Cannot stat {:?}: {}", entry.path(), e),
            }
        }
        None
    }
}

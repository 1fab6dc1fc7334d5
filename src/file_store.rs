/**
 * Directory-backed asset store
 *
 * Every image file below the configured roots is an asset, identified by its canonical
 * path. Its recorded date is the file modification time; corrections rewrite that time.
 * A batch that fails midway is rolled back to the previous modification times before
 * the failure is reported.
 */

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::SystemTime;
use walkdir::WalkDir;

use crate::error::StoreError;
use crate::store::{arrange, AssetQuery, AssetRecord, AssetStore, DateChange};

/// Containers kamadak-exif can read metadata from
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "tif", "tiff", "heic", "heif", "hif", "png", "webp",
];

#[derive(Debug)]
pub struct DirectoryStore {
    roots: Vec<PathBuf>,
    recursive: bool,
    /// Identifier -> file, as of the last enumeration. Identifiers are display strings
    /// and cannot always be turned back into the path (non-UTF-8 names).
    paths: Mutex<HashMap<String, PathBuf>>,
}

impl DirectoryStore {
    pub fn new(roots: Vec<PathBuf>, recursive: bool) -> Self {
        Self {
            roots,
            recursive,
            paths: Mutex::new(HashMap::new()),
        }
    }

    fn paths(&self) -> MutexGuard<'_, HashMap<String, PathBuf>> {
        self.paths.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn find_image_files(&self, directory: &Path) -> Vec<PathBuf> {
        let walkdir = if self.recursive {
            WalkDir::new(directory)
        } else {
            WalkDir::new(directory).max_depth(1)
        };

        let mut files = Vec::new();
        for entry in walkdir.into_iter().filter_map(|e| e.ok()) {
            if entry.file_type().is_file() && is_image(entry.path()) {
                match fs::canonicalize(entry.path()) {
                    Ok(path) => files.push(path),
                    Err(e) => warn!("Skipping {}: {}", entry.path().display(), e),
                }
            }
        }
        files
    }

    /// Resolve every identifier of a batch to its file.
    fn resolve(&self, changes: &[DateChange]) -> Vec<(PathBuf, SystemTime)> {
        let paths = self.paths();
        changes
            .iter()
            .map(|change| {
                let path = paths
                    .get(&change.identifier)
                    .cloned()
                    .unwrap_or_else(|| PathBuf::from(&change.identifier));
                (path, SystemTime::from(change.new_date))
            })
            .collect()
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

fn modification_time(path: &Path) -> Result<DateTime<Utc>> {
    let mtime = fs::metadata(path)
        .and_then(|m| m.modified())
        .with_context(|| format!("Failed to read modification time of {}", path.display()))?;
    Ok(DateTime::<Utc>::from(mtime))
}

fn set_modification_time(path: &Path, time: SystemTime) -> Result<()> {
    let file = fs::File::options()
        .write(true)
        .open(path)
        .with_context(|| format!("Failed to open {} for writing", path.display()))?;
    file.set_modified(time)
        .with_context(|| format!("Failed to set modification time of {}", path.display()))
}

/// Apply every change or restore the ones already made.
fn apply_batch(changes: &[(PathBuf, SystemTime)]) -> Result<()> {
    let mut previous = Vec::with_capacity(changes.len());
    for (path, new_time) in changes {
        let outcome = fs::metadata(path)
            .and_then(|m| m.modified())
            .with_context(|| format!("Failed to read modification time of {}", path.display()))
            .and_then(|old| {
                set_modification_time(path, *new_time)?;
                Ok(old)
            });

        match outcome {
            Ok(old) => previous.push((path, old)),
            Err(e) => {
                for (path, old) in previous.iter().rev() {
                    if let Err(restore) = set_modification_time(path, *old) {
                        warn!("Rollback failed for {}: {:#}", path.display(), restore);
                    }
                }
                return Err(e);
            }
        }
    }
    Ok(())
}

impl AssetStore for DirectoryStore {
    type Asset = PathBuf;

    fn enumerate(&self, query: &AssetQuery) -> Result<Vec<AssetRecord<PathBuf>>, StoreError> {
        let mut files = Vec::new();
        for root in &self.roots {
            if !root.is_dir() {
                return Err(StoreError::Enumeration(format!("not a directory: {}", root.display())));
            }
            let root = fs::canonicalize(root).map_err(|e| {
                StoreError::Enumeration(format!("cannot resolve {}: {}", root.display(), e))
            })?;
            info!("Scanning directory: {} (recursive: {})", root.display(), self.recursive);
            files.extend(self.find_image_files(&root));
        }

        // Overlapping roots reach the same canonical file
        files.sort();
        files.dedup();

        let mut paths = HashMap::with_capacity(files.len());
        let mut records = Vec::with_capacity(files.len());
        for path in files {
            let identifier = path.to_string_lossy().to_string();
            if paths.contains_key(&identifier) {
                warn!("Skipping {}: identifier already taken by another file", path.display());
                continue;
            }
            match modification_time(&path) {
                Ok(recorded_date) => {
                    paths.insert(identifier.clone(), path.clone());
                    records.push(AssetRecord {
                        identifier,
                        recorded_date,
                        asset: path,
                    });
                }
                Err(e) => warn!("Skipping {:#}", e),
            }
        }
        *self.paths() = paths;

        Ok(arrange(records, query))
    }

    fn fetch_payload<'a>(
        &'a self,
        record: &'a AssetRecord<PathBuf>,
    ) -> BoxFuture<'a, Result<Vec<u8>, StoreError>> {
        Box::pin(async move {
            debug!("Reading {}", record.asset.display());
            tokio::fs::read(&record.asset)
                .await
                .map_err(|e| StoreError::PayloadUnavailable {
                    identifier: record.identifier.clone(),
                    reason: e.to_string(),
                })
        })
    }

    fn apply_dates(&self, changes: Vec<DateChange>) -> BoxFuture<'_, Result<(), StoreError>> {
        let resolved = self.resolve(&changes);
        Box::pin(async move {
            let outcome = tokio::task::spawn_blocking(move || apply_batch(&resolved))
                .await
                .map_err(|e| StoreError::Transaction {
                    message: Some(format!("batch task failed: {}", e)),
                })?;
            outcome.map_err(|e| StoreError::Transaction {
                message: Some(format!("{:#}", e)),
            })
        })
    }
}

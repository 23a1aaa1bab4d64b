//! Diff Engine: classify documents as added, updated or deleted.

use crate::config::BookFormat;
use crate::db;
use crate::error::Result;
use std::collections::HashMap;
use std::io;
use std::path::Path;
use walkdir::WalkDir;

/// Document path to modification time, in seconds since the epoch.
pub type Snapshot = HashMap<String, i64>;

/// Paths needing work, each set sorted and disjoint from the others.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffResult {
    /// On disk but not cataloged.
    pub added: Vec<String>,
    /// Cataloged with a different modification time.
    pub updated: Vec<String>,
    /// Cataloged but gone from disk.
    pub deleted: Vec<String>,
}

impl DiffResult {
    /// Whether the catalog already matches the filesystem.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

/// Every recognized document under `root` with its mtime.
///
/// Any error while walking aborts the snapshot; a partial listing would
/// make the missing documents look deleted.
pub fn snapshot_filesystem(root: &Path) -> Result<Snapshot> {
    let mut snapshot = Snapshot::new();

    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() || BookFormat::from_path(entry.path()).is_none() {
            continue;
        }

        let Some(path) = entry.path().to_str() else {
            tracing::warn!(path = %entry.path().display(), "Skipping non UTF-8 path");
            continue;
        };

        let modified = entry.metadata().map_err(io::Error::from)?.modified()?;
        snapshot.insert(path.to_string(), db::timestamp(modified));
    }

    Ok(snapshot)
}

/// Compare the persisted catalog projection with the filesystem.
pub fn diff(persisted: &Snapshot, current: &Snapshot) -> DiffResult {
    let mut result = DiffResult::default();

    for (path, mtime) in current {
        match persisted.get(path) {
            None => result.added.push(path.clone()),
            Some(stored) if stored != mtime => result.updated.push(path.clone()),
            Some(_) => {}
        }
    }
    result.deleted = persisted
        .keys()
        .filter(|path| !current.contains_key(*path))
        .cloned()
        .collect();

    result.added.sort_unstable();
    result.updated.sort_unstable();
    result.deleted.sort_unstable();
    result
}

//! Reconciler: apply a diff to the catalog through the format extractors.

use crate::config::{BookFormat, Config};
use crate::db::{CatalogEntry, Database};
use crate::error::{AppError, Result, Stage};
use crate::formats::Toolkit;
use crate::imaging::THUMBNAIL_EXTENSION;
use crate::library::diff::{self, DiffResult};
use rayon::prelude::*;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// What the reconciler was doing with a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanAction {
    /// Cataloging a new document.
    Add,
    /// Re-extracting a changed document.
    Update,
    /// Removing a vanished document.
    Delete,
}

impl fmt::Display for ScanAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScanAction::Add => "add",
            ScanAction::Update => "update",
            ScanAction::Delete => "delete",
        })
    }
}

/// A per-path failure recorded during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanIssue {
    /// Document path.
    pub path: String,
    /// Action in progress.
    pub action: ScanAction,
    /// Failing extraction stage, if known.
    pub stage: Option<Stage>,
    /// Error message.
    pub message: String,
    /// Whether the catalog change for this path was still applied.
    pub applied: bool,
}

/// Counts and failures of one reconciliation pass.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// Entries inserted.
    pub added: usize,
    /// Entries re-extracted.
    pub updated: usize,
    /// Entries removed.
    pub deleted: usize,
    /// Documents whose mtime matched the catalog.
    pub unchanged: usize,
    /// Per-path failures, fatal or not.
    pub issues: Vec<ScanIssue>,
}

impl ScanReport {
    /// Number of paths whose catalog change was not applied.
    pub fn failed(&self) -> usize {
        self.issues.iter().filter(|i| !i.applied).count()
    }

    fn record(&mut self, action: ScanAction, outcomes: Vec<Outcome>) {
        for outcome in outcomes {
            if outcome.applied {
                match action {
                    ScanAction::Add => self.added += 1,
                    ScanAction::Update => self.updated += 1,
                    ScanAction::Delete => self.deleted += 1,
                }
            }
            self.issues.extend(outcome.issues);
        }
    }
}

impl fmt::Display for ScanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "added {}, updated {}, deleted {}, unchanged {}, failed {}",
            self.added,
            self.updated,
            self.deleted,
            self.unchanged,
            self.failed()
        )
    }
}

/// Result of reconciling one path.
#[derive(Debug, Default)]
struct Outcome {
    applied: bool,
    issues: Vec<ScanIssue>,
}

impl Outcome {
    fn applied() -> Self {
        Self {
            applied: true,
            issues: Vec::new(),
        }
    }

    fn failed(issue: ScanIssue) -> Self {
        Self {
            applied: false,
            issues: vec![issue],
        }
    }
}

/// Brings the catalog in line with the library directory.
pub struct Scanner {
    db: Database,
    toolkit: Toolkit,
    root: PathBuf,
    covers_dir: PathBuf,
    workers: usize,
}

impl Scanner {
    /// Create a scanner for the configured library root and cover cache.
    pub fn new(db: Database, toolkit: Toolkit, config: &Config) -> Self {
        Self {
            db,
            toolkit,
            root: absolute(&config.library.root),
            covers_dir: absolute(&config.cache.covers_dir),
            workers: config.scan.workers.max(1),
        }
    }

    /// Library root, absolute.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Cover cache directory, absolute.
    pub fn covers_dir(&self) -> &Path {
        &self.covers_dir
    }

    /// Thumbnail location for a document: the cover cache mirrors the
    /// library layout with the thumbnail extension.
    pub fn cover_path_for(&self, document: &Path) -> PathBuf {
        let relative = document
            .strip_prefix(&self.root)
            .unwrap_or_else(|_| Path::new(document.file_name().unwrap_or_default()));
        self.covers_dir
            .join(relative)
            .with_extension(THUMBNAIL_EXTENSION)
    }

    /// Run one reconciliation pass.
    ///
    /// Fails only if the filesystem or catalog cannot be enumerated. Per-path
    /// failures are collected in the report.
    pub fn run(&self) -> Result<ScanReport> {
        let start = Instant::now();

        let persisted = self.db.catalog_mtimes()?;
        let current = diff::snapshot_filesystem(&self.root)?;
        let DiffResult {
            added,
            updated,
            deleted,
        } = diff::diff(&persisted, &current);

        let mut report = ScanReport {
            unchanged: current.len() - added.len() - updated.len(),
            ..Default::default()
        };

        tracing::info!(
            root = %self.root.display(),
            added = added.len(),
            updated = updated.len(),
            deleted = deleted.len(),
            unchanged = report.unchanged,
            workers = self.workers,
            "Reconciling library"
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build scan pool: {}", e)))?;

        pool.install(|| {
            for (action, paths) in [
                (ScanAction::Add, &added),
                (ScanAction::Update, &updated),
                (ScanAction::Delete, &deleted),
            ] {
                let outcomes: Vec<Outcome> = paths
                    .par_iter()
                    .map(|path| self.reconcile(action, path))
                    .collect();
                report.record(action, outcomes);
            }
        });

        tracing::info!(
            added = report.added,
            updated = report.updated,
            deleted = report.deleted,
            unchanged = report.unchanged,
            failed = report.failed(),
            elapsed = ?start.elapsed(),
            "Scan complete"
        );

        Ok(report)
    }

    fn reconcile(&self, action: ScanAction, path: &str) -> Outcome {
        let result = match action {
            ScanAction::Add => self.add(path),
            ScanAction::Update => self.update(path),
            ScanAction::Delete => self.delete(path),
        };

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(
                    path = %path,
                    action = %action,
                    stage = ?e.stage(),
                    error = %e,
                    "Failed to reconcile document"
                );
                Outcome::failed(issue(path, action, &e, false))
            }
        }
    }

    fn add(&self, path: &str) -> Result<Outcome> {
        let document = Path::new(path);
        let format = BookFormat::detect(document)?;
        let handler = self.toolkit.handler(format);
        let meta = handler.extract_metadata(document)?;

        let mut outcome = Outcome::applied();
        let cover = self.cover_path_for(document);
        let cover_path = match handler.extract_cover(document, &cover) {
            Ok(()) => Some(cover.to_string_lossy().into_owned()),
            Err(e) => {
                self.cover_failed(path, ScanAction::Add, &e, &mut outcome);
                None
            }
        };

        let mut entry = CatalogEntry::new(path, format, meta.title, meta.modified);
        entry.cover_path = cover_path;

        if let Err(e) = self.db.insert_entry(&entry, &meta.keywords) {
            if let Some(written) = entry.cover_path.as_deref() {
                self.discard_cover(path, written);
            }
            return Err(e);
        }

        tracing::debug!(path = %path, format = format.as_str(), "Added document");
        Ok(outcome)
    }

    fn update(&self, path: &str) -> Result<Outcome> {
        let existing = self
            .db
            .get_entry(path)?
            .ok_or_else(|| AppError::StaleEntry(path.to_string()))?;

        let document = Path::new(path);
        let format = BookFormat::detect(document)?;
        let handler = self.toolkit.handler(format);
        let meta = handler.extract_metadata(document)?;

        let mut outcome = Outcome::applied();
        let cover = self.cover_path_for(document);
        let cover_path = match handler.extract_cover(document, &cover) {
            Ok(()) => Some(cover.to_string_lossy().into_owned()),
            Err(e) => {
                self.cover_failed(path, ScanAction::Update, &e, &mut outcome);
                // Keep the previous thumbnail only while it still exists.
                existing
                    .cover_path
                    .filter(|p| !p.is_empty() && Path::new(p).is_file())
            }
        };

        let found = self.db.update_entry(
            path,
            &meta.title,
            meta.modified,
            cover_path.as_deref(),
            &meta.keywords,
        )?;
        if !found {
            return Err(AppError::StaleEntry(path.to_string()));
        }

        tracing::debug!(path = %path, format = format.as_str(), "Updated document");
        Ok(outcome)
    }

    fn delete(&self, path: &str) -> Result<Outcome> {
        let existing = self
            .db
            .get_entry(path)?
            .ok_or_else(|| AppError::StaleEntry(path.to_string()))?;

        if let Some(cover) = existing.cover_path.as_deref().filter(|p| !p.is_empty()) {
            // Siblings differing only in extension share one thumbnail.
            if self.db.cover_in_use(cover, path)? {
                tracing::debug!(path = %path, cover = %cover, "Cover still referenced, keeping it");
            } else {
                match std::fs::remove_file(cover) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
            }
        }

        self.db.delete_entry(path)?;
        tracing::debug!(path = %path, "Deleted document");
        Ok(Outcome::applied())
    }

    /// Best-effort removal of a thumbnail written for a change that was not
    /// committed.
    fn discard_cover(&self, path: &str, cover: &str) {
        match self.db.cover_in_use(cover, path) {
            Ok(true) => return,
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(path = %path, cover = %cover, error = %e, "Keeping orphaned cover");
                return;
            }
        }
        if let Err(e) = std::fs::remove_file(cover) {
            tracing::warn!(path = %path, cover = %cover, error = %e, "Failed to remove orphaned cover");
        }
    }

    fn cover_failed(&self, path: &str, action: ScanAction, e: &AppError, outcome: &mut Outcome) {
        tracing::warn!(
            path = %path,
            action = %action,
            stage = ?e.stage(),
            error = %e,
            "Cover extraction failed"
        );
        outcome.issues.push(issue(path, action, e, true));
    }
}

fn issue(path: &str, action: ScanAction, e: &AppError, applied: bool) -> ScanIssue {
    ScanIssue {
        path: path.to_string(),
        action,
        stage: e.stage(),
        message: e.to_string(),
        applied,
    }
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

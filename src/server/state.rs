//! Application state shared across handlers.

use crate::config::Config;
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::formats::Toolkit;
use crate::library::{ScanReport, Scanner};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<Config>,
    /// Database connection.
    pub db: Database,
    /// Format extractors.
    pub toolkit: Toolkit,
    scanner: Arc<Scanner>,
    /// Whether a scan is currently in progress.
    scanning: Arc<AtomicBool>,
}

impl AppState {
    /// Create state with the external-tool backed toolkit.
    pub fn new(config: Config, db: Database) -> Self {
        let toolkit = Toolkit::from_config(&config);
        Self::with_toolkit(config, db, toolkit)
    }

    /// Create state with an explicit toolkit.
    pub fn with_toolkit(config: Config, db: Database, toolkit: Toolkit) -> Self {
        let scanner = Scanner::new(db.clone(), toolkit.clone(), &config);
        Self {
            config: Arc::new(config),
            db,
            toolkit,
            scanner: Arc::new(scanner),
            scanning: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Whether a scan is running.
    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }

    /// Run a reconciliation pass now, blocking.
    ///
    /// Returns `None` if another scan is already in progress.
    pub fn scan(&self) -> Result<Option<ScanReport>> {
        // Prevent concurrent scans
        let Some(_guard) = ScanGuard::acquire(&self.scanning) else {
            tracing::info!("Scan already in progress, skipping");
            return Ok(None);
        };

        self.scanner.run().map(Some)
    }

    /// Start a background scan (non-blocking).
    ///
    /// Returns `false` without starting anything if a scan is running.
    pub fn start_background_scan(&self) -> bool {
        let Some(guard) = ScanGuard::acquire(&self.scanning) else {
            tracing::info!("Scan already in progress, skipping");
            return false;
        };

        let scanner = self.scanner.clone();
        std::thread::spawn(move || {
            let _guard = guard;
            if let Err(e) = scanner.run() {
                tracing::error!(error = %e, "Background scan failed");
            }
        });
        true
    }

    /// Absolute path of a document given relative to the library root.
    pub fn document_path(&self, relative: &str) -> Result<PathBuf> {
        join_relative(self.scanner.root(), relative)
    }

    /// Absolute path of a thumbnail given relative to the cover cache.
    pub fn cover_file(&self, relative: &str) -> Result<PathBuf> {
        join_relative(self.scanner.covers_dir(), relative)
    }

    /// Catalog key for a document given relative to the library root.
    pub fn catalog_key(&self, relative: &str) -> Result<String> {
        let path = self.document_path(relative)?;
        path.to_str()
            .map(String::from)
            .ok_or_else(|| AppError::BadRequest("path is not UTF-8".into()))
    }

    /// Document path as exposed to clients.
    pub fn public_document_path(&self, path: &str) -> String {
        public_path(self.scanner.root(), path)
    }

    /// Cover path as exposed to clients, empty when there is none.
    pub fn public_cover_path(&self, cover: Option<&str>) -> String {
        cover
            .filter(|c| !c.is_empty())
            .map(|c| public_path(self.scanner.covers_dir(), c))
            .unwrap_or_default()
    }
}

/// Holds the scan flag; clears it on drop, including during unwinding.
struct ScanGuard(Arc<AtomicBool>);

impl ScanGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        if flag.swap(true, Ordering::SeqCst) {
            None
        } else {
            Some(Self(flag.clone()))
        }
    }
}

impl Drop for ScanGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Join a client-supplied relative path onto `base`.
///
/// Leading slashes are ignored. Parent, root and prefix components are
/// rejected so the result always stays under `base`.
pub fn join_relative(base: &Path, relative: &str) -> Result<PathBuf> {
    let relative = relative.trim_start_matches('/');
    let mut joined = base.to_path_buf();
    let mut depth = 0;

    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => {
                joined.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(AppError::BadRequest(format!("invalid path: {}", relative)));
            }
        }
    }

    if depth == 0 {
        return Err(AppError::BadRequest("missing path".into()));
    }
    Ok(joined)
}

fn public_path(base: &Path, path: &str) -> String {
    match Path::new(path).strip_prefix(base) {
        Ok(rel) => format!("/{}", rel.to_string_lossy()),
        Err(_) => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_stay_under_base() {
        let base = Path::new("/srv/books");
        assert_eq!(
            join_relative(base, "/scifi/Dune.epub").unwrap(),
            PathBuf::from("/srv/books/scifi/Dune.epub")
        );
        assert_eq!(
            join_relative(base, "./a.pdf").unwrap(),
            PathBuf::from("/srv/books/a.pdf")
        );
        assert!(matches!(
            join_relative(base, "/../etc/passwd"),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            join_relative(base, "a/../../b.pdf"),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(join_relative(base, "/"), Err(AppError::BadRequest(_))));
    }

    #[test]
    fn scan_guard_is_exclusive() {
        let flag = Arc::new(AtomicBool::new(false));
        let guard = ScanGuard::acquire(&flag).unwrap();
        assert!(ScanGuard::acquire(&flag).is_none());
        drop(guard);
        assert!(!flag.load(Ordering::SeqCst));
        assert!(ScanGuard::acquire(&flag).is_some());
    }

    #[test]
    fn scan_guard_clears_flag_when_scan_panics() {
        let flag = Arc::new(AtomicBool::new(false));
        let held = flag.clone();
        let result = std::thread::spawn(move || {
            let _guard = ScanGuard::acquire(&held).unwrap();
            panic!("extractor blew up");
        })
        .join();

        assert!(result.is_err());
        assert!(!flag.load(Ordering::SeqCst));
    }

    #[test]
    fn public_paths_are_root_relative() {
        assert_eq!(
            public_path(Path::new("/srv/books"), "/srv/books/scifi/Dune.epub"),
            "/scifi/Dune.epub"
        );
    }
}

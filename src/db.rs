mod schema;

pub use schema::Database;

use crate::config::BookFormat;
use chrono::{DateTime, Utc};
use std::time::SystemTime;

/// Catalog label for documents of unrecognized kind.
pub const UNKNOWN_FORMAT: &str = "UNKNOWN";

/// A document known to the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    /// Absolute document path, the identity of the entry.
    pub path: String,
    /// Container kind, `None` for unknown.
    pub format: Option<BookFormat>,
    /// Display title.
    pub title: String,
    /// Thumbnail file, `None` when extraction failed.
    pub cover_path: Option<String>,
    /// Filesystem mtime at the last successful metadata extraction.
    pub mtime: i64,
    /// When the entry was first cataloged.
    pub added_at: i64,
    /// Last read access, 0 if never opened.
    pub last_opened: i64,
    /// Opaque reader position.
    pub position: String,
    /// Reading progress in `[0, 1]`.
    pub progress: f64,
}

impl CatalogEntry {
    /// New entry as first seen by a scan.
    pub fn new(path: impl Into<String>, format: BookFormat, title: impl Into<String>, mtime: i64) -> Self {
        Self {
            path: path.into(),
            format: Some(format),
            title: title.into(),
            cover_path: None,
            mtime,
            added_at: now_timestamp(),
            last_opened: 0,
            position: String::new(),
            progress: 0.0,
        }
    }

    /// Catalog label of the container kind.
    pub fn format_label(&self) -> &'static str {
        self.format.map(|f| f.as_str()).unwrap_or(UNKNOWN_FORMAT)
    }
}

/// Listing sort column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    /// Display title.
    #[default]
    Title,
    /// First cataloged.
    AddedTime,
    /// Last read access.
    LastOpened,
    /// Reading progress.
    Progress,
}

impl SortKey {
    /// Parse a query parameter; unknown keys are rejected.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "title" => Some(SortKey::Title),
            "added_time" => Some(SortKey::AddedTime),
            "last_opened" => Some(SortKey::LastOpened),
            "progress" => Some(SortKey::Progress),
            _ => None,
        }
    }

    fn column(&self) -> &'static str {
        match self {
            SortKey::Title => "title",
            SortKey::AddedTime => "added_at",
            SortKey::LastOpened => "last_opened",
            SortKey::Progress => "progress",
        }
    }
}

/// Listing sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

impl SortOrder {
    /// Parse `asc` or `desc`, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Some(SortOrder::Asc),
            "desc" => Some(SortOrder::Desc),
            _ => None,
        }
    }

    fn keyword(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Sorting and pagination of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListQuery {
    /// Sort column.
    pub sort: SortKey,
    /// Sort direction.
    pub order: SortOrder,
    /// 1-based page number.
    pub page: usize,
    /// Entries per page.
    pub page_size: usize,
}

impl ListQuery {
    fn offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.page_size)
    }
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            sort: SortKey::default(),
            order: SortOrder::default(),
            page: 1,
            page_size: 20,
        }
    }
}

/// One page of catalog entries.
#[derive(Debug, Clone, Default)]
pub struct Listing {
    /// Entries on this page.
    pub entries: Vec<CatalogEntry>,
    /// Whether a further page exists.
    pub has_more: bool,
}

/// Timestamp helper.
pub fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Seconds since the epoch of a filesystem time.
pub fn timestamp(time: SystemTime) -> i64 {
    DateTime::<Utc>::from(time).timestamp()
}

/// Clamp reported progress into `[0, 1]`; NaN becomes 0.
pub fn clamp_progress(progress: f64) -> f64 {
    if progress.is_nan() {
        0.0
    } else {
        progress.clamp(0.0, 1.0)
    }
}

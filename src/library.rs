//! Keeping the catalog consistent with the library directory.

pub mod diff;
pub mod scan;

pub use diff::{DiffResult, Snapshot, diff, snapshot_filesystem};
pub use scan::{ScanAction, ScanIssue, ScanReport, Scanner};

//! folio-rs: a self-hosted reader backend for ebooks and comics.
//!
//! The library directory is reconciled into a SQLite catalog by an
//! incremental scan: only documents whose modification time changed are
//! re-extracted. Metadata and cover thumbnails come from EPUB, PDF, CBZ
//! and CBR files, using 7-Zip and the Poppler/Ghostscript tools where an
//! in-process reader is not available.
//!
//! # Features
//!
//! - Incremental add/update/delete reconciliation with per-path failures
//! - EPUB package metadata, PDF info dictionary keywords
//! - WebP cover thumbnails mirrored under a cache directory
//! - Page counts and on-demand page images for PDFs and comics
//! - Sorted, paginated listing and keyword/title search
//! - Reading position and progress tracking

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Archive listing and extraction.
pub mod archive;
/// Configuration and CLI.
pub mod config;
/// Catalog persistence.
pub mod db;
/// Error types.
pub mod error;
/// Document format handlers.
pub mod formats;
/// Image decoding and thumbnail encoding.
pub mod imaging;
/// Library reconciliation.
pub mod library;
/// PDF info and rasterization through external tools.
pub mod pdf;
/// HTTP server.
pub mod server;
/// External process invocation.
pub mod tools;


pub use config::{Cli, Command, Config};
pub use db::Database;
pub use error::{AppError, Result};
pub use server::AppState;

mod comic;
mod epub;
mod pdf;

pub use comic::ComicHandler;
pub use epub::EpubHandler;
pub use pdf::PdfHandler;

use crate::archive::{self, ArchiveAccessor, SevenZip, ZipAccessor};
use crate::config::{ArchiveBackend, BookFormat, Config, RenderConfig};
use crate::error::{AppError, Result, Stage, StageExt};
use crate::imaging::Thumbnailer;
use crate::pdf::{PdfBackend, PdfTools};
use std::path::Path;
use std::sync::Arc;

/// Metadata derived from a document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    /// Display title.
    pub title: String,
    /// Search keywords, in extraction order.
    pub keywords: Vec<String>,
    /// Filesystem modification time, seconds since the epoch.
    pub modified: i64,
}

/// A single page image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Encoded image bytes.
    pub data: Vec<u8>,
    /// MIME type of `data`.
    pub mime: &'static str,
}

/// Trait for format-specific document handlers.
pub trait FormatHandler: Send + Sync {
    /// Extract title, keywords and modification time.
    fn extract_metadata(&self, path: &Path) -> Result<Metadata>;

    /// Write a cover thumbnail for the document to `output`.
    fn extract_cover(&self, path: &Path, output: &Path) -> Result<()>;

    /// Page access, for formats without native reflowable content.
    fn pages(&self) -> Option<&dyn PagedFormat> {
        None
    }
}

/// Random access to single pages of a document.
pub trait PagedFormat {
    /// Number of renderable pages; zero is [`AppError::NoRenderablePages`].
    fn page_count(&self, path: &Path) -> Result<u32>;

    /// Image of the 1-based `page`.
    fn fetch_page(&self, path: &Path, page: u32) -> Result<Page>;
}

/// Check `page` against `1..=count`.
pub fn check_page(page: u32, count: u32) -> Result<()> {
    if page == 0 || page > count {
        return Err(AppError::PageOutOfRange { page, count });
    }
    Ok(())
}

/// Filename without extension, used when a document carries no title.
pub fn fallback_title(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Filesystem modification time in seconds since the epoch.
pub fn modified_time(path: &Path) -> Result<i64> {
    let modified = std::fs::metadata(path)?.modified()?;
    Ok(crate::db::timestamp(modified))
}

/// Thumbnail the first image entry of a zip-like container.
fn cover_from_archive(
    archive: &dyn ArchiveAccessor,
    thumbnailer: &Thumbnailer,
    path: &Path,
    output: &Path,
) -> Result<()> {
    let entries = archive.list_entries(path).stage(Stage::List)?;
    let entry = archive::cover_candidate(entries).ok_or_else(|| {
        AppError::InvalidFormat(format!("no image entries in {}", path.display())).at(Stage::List)
    })?;

    let data = archive.extract_entry(path, &entry).stage(Stage::Extract)?;
    thumbnailer.thumbnail_from_bytes(&data, output)
}

/// Everything the extractors need, built once from configuration.
#[derive(Clone)]
pub struct Toolkit {
    archive: Arc<dyn ArchiveAccessor>,
    rar: Arc<dyn ArchiveAccessor>,
    pdf: Arc<dyn PdfBackend>,
    thumbnailer: Thumbnailer,
    render: RenderConfig,
}

impl Toolkit {
    /// Create from explicit collaborators.
    ///
    /// `archive` serves EPUB and CBZ, `rar` serves CBR.
    pub fn new(
        archive: Arc<dyn ArchiveAccessor>,
        rar: Arc<dyn ArchiveAccessor>,
        pdf: Arc<dyn PdfBackend>,
        thumbnailer: Thumbnailer,
        render: RenderConfig,
    ) -> Self {
        Self {
            archive,
            rar,
            pdf,
            thumbnailer,
            render,
        }
    }

    /// Create the external-tool backed toolkit from configuration.
    pub fn from_config(config: &Config) -> Self {
        let seven_zip: Arc<dyn ArchiveAccessor> =
            Arc::new(SevenZip::new(config.tools.seven_zip.clone()));
        let archive: Arc<dyn ArchiveAccessor> = match config.tools.archive_backend {
            ArchiveBackend::SevenZip => seven_zip.clone(),
            ArchiveBackend::Builtin => Arc::new(ZipAccessor),
        };

        Self::new(
            archive,
            seven_zip,
            Arc::new(PdfTools::from_config(&config.tools)),
            Thumbnailer::from_config(&config.cache),
            config.render.clone(),
        )
    }

    /// Get the handler for a container kind.
    pub fn handler(&self, format: BookFormat) -> Box<dyn FormatHandler> {
        match format {
            BookFormat::Epub => Box::new(EpubHandler::new(self.archive.clone(), self.thumbnailer)),
            BookFormat::Pdf => Box::new(PdfHandler::new(
                self.pdf.clone(),
                self.thumbnailer,
                self.render.clone(),
            )),
            BookFormat::Cbz => Box::new(ComicHandler::new(self.archive.clone(), self.thumbnailer)),
            BookFormat::Cbr => Box::new(ComicHandler::new(self.rar.clone(), self.thumbnailer)),
        }
    }

    /// Page count of a paginated document.
    pub fn page_count(&self, format: BookFormat, path: &Path) -> Result<u32> {
        let handler = self.handler(format);
        paged(handler.as_ref(), format)?.page_count(path)
    }

    /// One page of a paginated document.
    pub fn fetch_page(&self, format: BookFormat, path: &Path, page: u32) -> Result<Page> {
        let handler = self.handler(format);
        paged(handler.as_ref(), format)?.fetch_page(path, page)
    }
}

fn paged(handler: &dyn FormatHandler, format: BookFormat) -> Result<&dyn PagedFormat> {
    handler
        .pages()
        .ok_or_else(|| AppError::BadRequest(format!("{} has no pages", format.as_str())))
}

//! Comic archive (CBZ, CBR) handler.

use crate::archive::{self, ArchiveAccessor};
use crate::error::{AppError, Result, Stage, StageExt};
use crate::formats::{
    FormatHandler, Metadata, Page, PagedFormat, check_page, cover_from_archive, fallback_title,
    modified_time,
};
use crate::imaging::Thumbnailer;
use std::path::Path;
use std::sync::Arc;

/// Handler for comic book archives.
///
/// Pages are the image entries in byte-wise name order.
pub struct ComicHandler {
    archive: Arc<dyn ArchiveAccessor>,
    thumbnailer: Thumbnailer,
}

impl ComicHandler {
    /// Create a handler reading containers through `archive`.
    pub fn new(archive: Arc<dyn ArchiveAccessor>, thumbnailer: Thumbnailer) -> Self {
        Self {
            archive,
            thumbnailer,
        }
    }

    fn images(&self, path: &Path) -> Result<Vec<String>> {
        let images = self.archive.image_entries(path).stage(Stage::List)?;
        if images.is_empty() {
            return Err(AppError::NoRenderablePages(path.display().to_string()));
        }
        Ok(images)
    }
}

impl FormatHandler for ComicHandler {
    fn extract_metadata(&self, path: &Path) -> Result<Metadata> {
        Ok(Metadata {
            title: fallback_title(path),
            keywords: Vec::new(),
            modified: modified_time(path)?,
        })
    }

    fn extract_cover(&self, path: &Path, output: &Path) -> Result<()> {
        cover_from_archive(self.archive.as_ref(), &self.thumbnailer, path, output)
    }

    fn pages(&self) -> Option<&dyn PagedFormat> {
        Some(self)
    }
}

impl PagedFormat for ComicHandler {
    fn page_count(&self, path: &Path) -> Result<u32> {
        Ok(self.images(path)?.len() as u32)
    }

    fn fetch_page(&self, path: &Path, page: u32) -> Result<Page> {
        let images = self.images(path)?;
        check_page(page, images.len() as u32)?;

        let entry = &images[page as usize - 1];
        let data = self.archive.extract_entry(path, entry).stage(Stage::Extract)?;

        Ok(Page {
            data,
            mime: archive::image_mime_type(entry),
        })
    }
}

use crate::config::RenderConfig;
use crate::error::{AppError, Result, Stage, StageExt};
use crate::formats::{FormatHandler, Metadata, Page, PagedFormat, check_page, fallback_title, modified_time};
use crate::imaging::Thumbnailer;
use crate::pdf::PdfBackend;
use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Handler for PDF files.
pub struct PdfHandler {
    backend: Arc<dyn PdfBackend>,
    thumbnailer: Thumbnailer,
    render: RenderConfig,
}

impl PdfHandler {
    /// Create a handler using `backend` for info and rasterization.
    pub fn new(backend: Arc<dyn PdfBackend>, thumbnailer: Thumbnailer, render: RenderConfig) -> Self {
        Self {
            backend,
            thumbnailer,
            render,
        }
    }

    /// Rasterize one page into a temp file that is removed on drop.
    fn rasterize(&self, path: &Path, page: u32, dpi: u32) -> Result<NamedTempFile> {
        let output = tempfile::Builder::new()
            .prefix("folio-page-")
            .suffix(".png")
            .tempfile()
            .stage(Stage::Render)?;

        self.backend
            .rasterize(path, page, dpi, output.path())
            .stage(Stage::Render)?;
        Ok(output)
    }
}

impl FormatHandler for PdfHandler {
    fn extract_metadata(&self, path: &Path) -> Result<Metadata> {
        let info = self.backend.info(path).stage(Stage::Info)?;

        let title = info
            .title()
            .map(String::from)
            .unwrap_or_else(|| fallback_title(path));
        let keywords = info
            .author()
            .map(String::from)
            .into_iter()
            .chain(info.keywords())
            .collect();

        Ok(Metadata {
            title,
            keywords,
            modified: modified_time(path)?,
        })
    }

    fn extract_cover(&self, path: &Path, output: &Path) -> Result<()> {
        let raster = self.rasterize(path, 1, self.render.cover_dpi)?;
        self.thumbnailer.thumbnail_from_file(raster.path(), output)
    }

    fn pages(&self) -> Option<&dyn PagedFormat> {
        Some(self)
    }
}

impl PagedFormat for PdfHandler {
    fn page_count(&self, path: &Path) -> Result<u32> {
        let count = self.backend.info(path).stage(Stage::Info)?.pages();
        if count == 0 {
            return Err(AppError::NoRenderablePages(path.display().to_string()));
        }
        Ok(count)
    }

    fn fetch_page(&self, path: &Path, page: u32) -> Result<Page> {
        check_page(page, self.page_count(path)?)?;

        let raster = self.rasterize(path, page, self.render.dpi)?;
        let data = std::fs::read(raster.path()).stage(Stage::Render)?;

        Ok(Page {
            data,
            mime: "image/png",
        })
    }
}

//! EPUB format handler.

use crate::archive::ArchiveAccessor;
use crate::error::{AppError, Result, Stage, StageExt};
use crate::formats::{FormatHandler, Metadata, cover_from_archive, fallback_title, modified_time};
use crate::imaging::Thumbnailer;
use roxmltree::Document;
use std::path::Path;
use std::sync::Arc;

const CONTAINER_XML: &str = "META-INF/container.xml";

/// Fields read from the OPF `<metadata>` element.
#[derive(Debug, Default, PartialEq, Eq)]
struct PackageMetadata {
    title: Option<String>,
    creator: Option<String>,
    subjects: Vec<String>,
}

/// Handler for EPUB files.
pub struct EpubHandler {
    archive: Arc<dyn ArchiveAccessor>,
    thumbnailer: Thumbnailer,
}

impl EpubHandler {
    /// Create a handler reading containers through `archive`.
    pub fn new(archive: Arc<dyn ArchiveAccessor>, thumbnailer: Thumbnailer) -> Self {
        Self {
            archive,
            thumbnailer,
        }
    }

    fn read_text(&self, path: &Path, entry: &str) -> Result<String> {
        let bytes = self.archive.extract_entry(path, entry).stage(Stage::Extract)?;
        String::from_utf8(bytes)
            .map_err(|_| AppError::InvalidFormat(format!("{} is not UTF-8", entry)))
    }
}

/// Find the package document path from container.xml.
fn find_opf_path(container: &str) -> Result<String> {
    let doc = Document::parse(container)?;

    doc.descendants()
        .find(|n| n.has_tag_name("rootfile"))
        .and_then(|n| n.attribute("full-path"))
        .map(String::from)
        .ok_or_else(|| AppError::InvalidFormat("No rootfile in container.xml".into()))
}

/// Parse title, creator and subjects from the package document.
fn parse_opf(content: &str) -> Result<PackageMetadata> {
    let doc = Document::parse(content)?;
    let mut meta = PackageMetadata::default();

    let Some(metadata) = doc.descendants().find(|n| n.has_tag_name("metadata")) else {
        return Ok(meta);
    };

    for node in metadata.children().filter(|n| n.is_element()) {
        let Some(text) = node.text().map(str::trim).filter(|t| !t.is_empty()) else {
            continue;
        };
        match node.tag_name().name() {
            "title" if meta.title.is_none() => meta.title = Some(text.to_string()),
            "creator" if meta.creator.is_none() => meta.creator = Some(text.to_string()),
            "subject" => meta.subjects.push(text.to_string()),
            _ => {}
        }
    }

    Ok(meta)
}

impl FormatHandler for EpubHandler {
    fn extract_metadata(&self, path: &Path) -> Result<Metadata> {
        let container = self.read_text(path, CONTAINER_XML)?;
        let opf_path = find_opf_path(&container)?;
        let opf = self.read_text(path, &opf_path)?;
        let package = parse_opf(&opf)?;

        let keywords = package.creator.into_iter().chain(package.subjects).collect();

        Ok(Metadata {
            title: package.title.unwrap_or_else(|| fallback_title(path)),
            keywords,
            modified: modified_time(path)?,
        })
    }

    fn extract_cover(&self, path: &Path, output: &Path) -> Result<()> {
        cover_from_archive(self.archive.as_ref(), &self.thumbnailer, path, output)
    }
}

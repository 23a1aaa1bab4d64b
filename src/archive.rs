//! Archive Accessor: list and extract named entries inside container files.

mod builtin;
mod seven_zip;

pub use self::builtin::ZipAccessor;
pub use self::seven_zip::SevenZip;

use crate::error::Result;
use std::path::Path;

/// Raster image extensions recognised inside containers.
pub const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "webp", "bmp"];

/// Uniform entry access over a container file.
pub trait ArchiveAccessor: Send + Sync {
    /// Entry names in the order the container reports them.
    fn list_entries(&self, archive: &Path) -> Result<Vec<String>>;

    /// Full bytes of one named entry.
    fn extract_entry(&self, archive: &Path, entry: &str) -> Result<Vec<u8>>;

    /// Sorted image entries of the container.
    fn image_entries(&self, archive: &Path) -> Result<Vec<String>> {
        Ok(image_entries(self.list_entries(archive)?))
    }
}

/// Check if an entry name has a recognised image extension (case-insensitive).
///
/// Resource-fork shadows under `__MACOSX/` never count, whichever backend
/// listed them.
pub fn is_image_entry(name: &str) -> bool {
    if name.split(['/', '\\']).any(|part| part == "__MACOSX") {
        return false;
    }
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Keep image entries and sort them byte-wise.
///
/// Page N of a comic and the cover of any zip-like container are defined
/// by this ordering, not by the container's own.
pub fn image_entries<I>(entries: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut images: Vec<String> = entries
        .into_iter()
        .filter(|name| is_image_entry(name))
        .collect();
    images.sort_unstable();
    images
}

/// First image entry in byte-wise order.
pub fn cover_candidate<I>(entries: I) -> Option<String>
where
    I: IntoIterator<Item = String>,
{
    image_entries(entries).into_iter().next()
}

/// MIME type for an image entry, from its extension.
pub fn image_mime_type(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        _ => "application/octet-stream",
    }
}

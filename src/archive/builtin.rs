//! In-process accessor for ZIP containers (EPUB, CBZ).

use crate::archive::ArchiveAccessor;
use crate::error::Result;
use ::zip::ZipArchive;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Archive accessor reading ZIP files with the `zip` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipAccessor;

impl ZipAccessor {
    fn open(archive: &Path) -> Result<ZipArchive<File>> {
        let file = File::open(archive)?;
        Ok(ZipArchive::new(file)?)
    }
}

impl ArchiveAccessor for ZipAccessor {
    fn list_entries(&self, archive: &Path) -> Result<Vec<String>> {
        let archive = Self::open(archive)?;
        Ok(archive
            .file_names()
            .filter(|name| !name.ends_with('/'))
            .map(String::from)
            .collect())
    }

    fn extract_entry(&self, archive: &Path, entry: &str) -> Result<Vec<u8>> {
        let mut archive = Self::open(archive)?;
        let mut file = archive.by_name(entry)?;

        let mut data = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut data)?;
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use ::zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut writer = ::zip::ZipWriter::new(file);
        let options =
            SimpleFileOptions::default().compression_method(::zip::CompressionMethod::Stored);
        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn lists_and_extracts_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.cbz");
        write_zip(
            &path,
            &[
                ("02.png", b"second"),
                ("__MACOSX/._01.png", b"junk"),
                ("01.png", b"first"),
            ],
        );

        let entries = ZipAccessor.list_entries(&path).unwrap();
        assert_eq!(
            entries,
            vec![
                "02.png".to_string(),
                "__MACOSX/._01.png".to_string(),
                "01.png".to_string()
            ]
        );
        assert_eq!(ZipAccessor.extract_entry(&path, "01.png").unwrap(), b"first");
        assert_eq!(
            ZipAccessor.image_entries(&path).unwrap(),
            vec!["01.png".to_string(), "02.png".to_string()]
        );
    }

    #[test]
    fn missing_entry_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.cbz");
        write_zip(&path, &[("01.png", b"first")]);

        assert!(ZipAccessor.extract_entry(&path, "99.png").is_err());
    }
}

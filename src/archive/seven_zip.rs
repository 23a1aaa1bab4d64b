//! `7z`-backed accessor, used for ZIP and RAR containers alike.

use crate::archive::ArchiveAccessor;
use crate::error::Result;
use crate::tools;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Columns in a `7z l -ba` file line: date, time, attributes, size, packed size, name.
const MIN_LISTING_COLUMNS: usize = 6;

/// Archive accessor spawning the `7z` command line tool.
#[derive(Debug, Clone)]
pub struct SevenZip {
    program: PathBuf,
}

impl SevenZip {
    /// Use the given `7z` executable.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for SevenZip {
    fn default() -> Self {
        Self::new("7z")
    }
}

impl ArchiveAccessor for SevenZip {
    fn list_entries(&self, archive: &Path) -> Result<Vec<String>> {
        let out = tools::run(
            &self.program,
            [OsStr::new("l"), OsStr::new("-ba"), archive.as_os_str()],
        )?;
        Ok(parse_listing(&String::from_utf8_lossy(&out)))
    }

    fn extract_entry(&self, archive: &Path, entry: &str) -> Result<Vec<u8>> {
        tools::run(
            &self.program,
            [
                OsStr::new("x"),
                OsStr::new("-so"),
                archive.as_os_str(),
                OsStr::new(entry),
            ],
        )
    }
}

/// Entry names from `7z l -ba` output.
///
/// Only the last whitespace-separated column is kept, and only on lines with
/// at least [`MIN_LISTING_COLUMNS`] columns.
pub fn parse_listing(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < MIN_LISTING_COLUMNS {
                return None;
            }
            cols.last().map(|name| name.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_keeps_last_column_of_full_lines() {
        let out = "\
2021-03-04 10:11:12 ....A        51234        50011  pages/002.jpg
2021-03-04 10:11:12 ....A        48760        47000  pages/001.jpg
2021-03-04 10:11:12 D....            0            0  pages
2021-03-04 10:11:12 ....A          120               ComicInfo.xml

";
        assert_eq!(
            parse_listing(out),
            vec![
                "pages/002.jpg".to_string(),
                "pages/001.jpg".to_string(),
                "pages".to_string(),
            ]
        );
    }

    #[test]
    fn listing_of_empty_output_is_empty() {
        assert!(parse_listing("").is_empty());
    }
}

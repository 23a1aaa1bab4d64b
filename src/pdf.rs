//! PDF document info and page rasterization through external tools.

use crate::config::{RasterizerKind, ToolsConfig};
use crate::error::{AppError, Result};
use crate::tools;
use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Parsed `pdfinfo` output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PdfInfo {
    fields: HashMap<String, String>,
}

impl PdfInfo {
    /// Parse line-oriented `Key: value` output.
    ///
    /// The key is everything before the first colon; both sides are trimmed.
    pub fn parse(output: &str) -> Self {
        let fields = output
            .lines()
            .filter_map(|line| line.split_once(':'))
            .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
            .collect();
        Self { fields }
    }

    /// Non-empty value of a field.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Document title.
    pub fn title(&self) -> Option<&str> {
        self.get("Title")
    }

    /// Document author.
    pub fn author(&self) -> Option<&str> {
        self.get("Author")
    }

    /// Comma-separated keywords, trimmed, empty items dropped.
    pub fn keywords(&self) -> Vec<String> {
        self.get("Keywords")
            .map(|kw| {
                kw.split(',')
                    .map(str::trim)
                    .filter(|k| !k.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Page count, 0 when missing or unparsable.
    pub fn pages(&self) -> u32 {
        self.get("Pages")
            .and_then(|p| p.parse().ok())
            .unwrap_or(0)
    }
}

/// Operations the core needs on PDF files.
pub trait PdfBackend: Send + Sync {
    /// Document info dictionary and page count.
    fn info(&self, pdf: &Path) -> Result<PdfInfo>;

    /// Render one 1-based page as PNG into `output`.
    fn rasterize(&self, pdf: &Path, page: u32, dpi: u32, output: &Path) -> Result<()>;
}

/// Which rasterizer program to drive.
#[derive(Debug, Clone)]
pub enum Rasterizer {
    /// Ghostscript, writing directly to the output file.
    Ghostscript(PathBuf),
    /// Poppler `pdftoppm`, writing `<prefix>.png` in single-file mode.
    Pdftoppm(PathBuf),
}

impl Rasterizer {
    fn program(&self) -> &Path {
        match self {
            Rasterizer::Ghostscript(p) | Rasterizer::Pdftoppm(p) => p,
        }
    }

    /// Command line rendering `page` of `pdf` into `output`.
    pub fn args(&self, pdf: &Path, page: u32, dpi: u32, output: &Path) -> Result<Vec<OsString>> {
        match self {
            Rasterizer::Ghostscript(_) => {
                let mut out_arg = OsString::from("-sOutputFile=");
                out_arg.push(output);
                Ok(vec![
                    "-q".into(),
                    "-sDEVICE=png16m".into(),
                    "-dUseCIEColor=false".into(),
                    format!("-dFirstPage={}", page).into(),
                    format!("-dLastPage={}", page).into(),
                    format!("-r{}", dpi).into(),
                    "-dNOPAUSE".into(),
                    "-dBATCH".into(),
                    "-dSAFER".into(),
                    out_arg,
                    pdf.into(),
                ])
            }
            Rasterizer::Pdftoppm(_) => {
                if output.extension().and_then(|e| e.to_str()) != Some("png") {
                    return Err(AppError::Internal(format!(
                        "pdftoppm output must end in .png: {}",
                        output.display()
                    )));
                }
                let prefix = output.with_extension("");
                let page = page.to_string();
                Ok(vec![
                    "-png".into(),
                    "-f".into(),
                    page.clone().into(),
                    "-l".into(),
                    page.into(),
                    "-r".into(),
                    dpi.to_string().into(),
                    "-singlefile".into(),
                    pdf.into(),
                    prefix.into(),
                ])
            }
        }
    }
}

/// [`PdfBackend`] using `pdfinfo` and a configurable rasterizer.
#[derive(Debug, Clone)]
pub struct PdfTools {
    pdfinfo: PathBuf,
    rasterizer: Rasterizer,
}

impl PdfTools {
    /// Create from explicit programs.
    pub fn new(pdfinfo: impl Into<PathBuf>, rasterizer: Rasterizer) -> Self {
        Self {
            pdfinfo: pdfinfo.into(),
            rasterizer,
        }
    }

    /// Create from the `[tools]` config section.
    pub fn from_config(tools: &ToolsConfig) -> Self {
        let rasterizer = match tools.rasterizer {
            RasterizerKind::Ghostscript => Rasterizer::Ghostscript(tools.ghostscript.clone()),
            RasterizerKind::Pdftoppm => Rasterizer::Pdftoppm(tools.pdftoppm.clone()),
        };
        Self::new(tools.pdfinfo.clone(), rasterizer)
    }
}

impl PdfBackend for PdfTools {
    fn info(&self, pdf: &Path) -> Result<PdfInfo> {
        let out = tools::run(&self.pdfinfo, [pdf.as_os_str()])?;
        Ok(PdfInfo::parse(&String::from_utf8_lossy(&out)))
    }

    fn rasterize(&self, pdf: &Path, page: u32, dpi: u32, output: &Path) -> Result<()> {
        let args = self.rasterizer.args(pdf, page, dpi, output)?;
        tools::run(self.rasterizer.program(), args)?;

        // The output may be a pre-created empty temp file.
        let written = std::fs::metadata(output)
            .map(|m| m.len() > 0)
            .unwrap_or(false);
        if !written {
            return Err(AppError::Tool {
                tool: self.rasterizer.program().display().to_string(),
                message: format!("no output written for page {}", page),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PDFINFO: &str = "\
Title:           The Art of Rust
Author:          Jane Doe
Keywords:        systems, programming,, rust
Creator:         LaTeX
Pages:           312
Page size:       612 x 792 pts (letter)
";

    #[test]
    fn parses_pdfinfo_fields() {
        let info = PdfInfo::parse(PDFINFO);
        assert_eq!(info.title(), Some("The Art of Rust"));
        assert_eq!(info.author(), Some("Jane Doe"));
        assert_eq!(info.keywords(), vec!["systems", "programming", "rust"]);
        assert_eq!(info.pages(), 312);
        assert_eq!(info.get("Page size"), Some("612 x 792 pts (letter)"));
    }

    #[test]
    fn empty_fields_are_absent() {
        let info = PdfInfo::parse("Title:   \nPages: x\n");
        assert_eq!(info.title(), None);
        assert!(info.keywords().is_empty());
        assert_eq!(info.pages(), 0);
    }

    #[test]
    fn ghostscript_renders_exactly_one_page() {
        let gs = Rasterizer::Ghostscript("gs".into());
        let args = gs
            .args(Path::new("/b/doc.pdf"), 7, 300, Path::new("/tmp/p.png"))
            .unwrap();
        assert!(args.contains(&OsString::from("-dFirstPage=7")));
        assert!(args.contains(&OsString::from("-dLastPage=7")));
        assert!(args.contains(&OsString::from("-r300")));
        assert!(args.contains(&OsString::from("-sOutputFile=/tmp/p.png")));
        assert_eq!(args.last(), Some(&OsString::from("/b/doc.pdf")));
    }

    #[test]
    fn pdftoppm_uses_output_prefix() {
        let tool = Rasterizer::Pdftoppm("pdftoppm".into());
        let args = tool
            .args(Path::new("/b/doc.pdf"), 1, 150, Path::new("/tmp/cover.png"))
            .unwrap();
        assert_eq!(args.last(), Some(&OsString::from("/tmp/cover")));
        assert!(args.contains(&OsString::from("-singlefile")));
        assert!(
            tool.args(Path::new("/b/doc.pdf"), 1, 150, Path::new("/tmp/cover.jpg"))
                .is_err()
        );
    }
}

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Reader backend for ebooks and comics.
#[derive(Parser, Debug, Clone)]
#[command(name = "folio-rs")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file.
    #[arg(short, long, env = "FOLIO_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Scan the library, then start the server (default if no command given).
    Serve {
        /// Address to bind the server to.
        #[arg(short, long)]
        bind: Option<SocketAddr>,

        /// Library root directory (overrides the config file).
        #[arg(short, long)]
        library: Option<PathBuf>,
    },

    /// Run a single reconciliation pass and print a report.
    Scan {
        /// Library root directory (overrides the config file).
        #[arg(short, long)]
        library: Option<PathBuf>,
    },

    /// Create a default config file.
    Init {
        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },
}

/// Main configuration from TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Library location.
    #[serde(default)]
    pub library: LibraryConfig,

    /// Cover cache configuration.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Page rendering configuration.
    #[serde(default)]
    pub render: RenderConfig,

    /// External tools.
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Scan configuration.
    #[serde(default)]
    pub scan: ScanConfig,

    /// Listing API configuration.
    #[serde(default)]
    pub api: ApiConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to.
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::new(
        std::net::IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0)),
        8080,
    )
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/library.db")
}

/// Library configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Directory holding the documents.
    #[serde(default = "default_library_root")]
    pub root: PathBuf,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            root: default_library_root(),
        }
    }
}

fn default_library_root() -> PathBuf {
    PathBuf::from("books")
}

/// Cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory for generated cover thumbnails.
    #[serde(default = "default_cache_dir")]
    pub covers_dir: PathBuf,

    /// Thumbnail short side in pixels.
    #[serde(default = "default_thumbnail_size")]
    pub thumbnail_size: u32,

    /// Lossy thumbnail quality (0-100).
    #[serde(default = "default_thumbnail_quality")]
    pub thumbnail_quality: u8,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            covers_dir: default_cache_dir(),
            thumbnail_size: default_thumbnail_size(),
            thumbnail_quality: default_thumbnail_quality(),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("data/covers")
}

fn default_thumbnail_size() -> u32 {
    200
}

fn default_thumbnail_quality() -> u8 {
    70
}

/// PDF rendering configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Resolution for page reads.
    #[serde(default = "default_dpi")]
    pub dpi: u32,

    /// Resolution for the first-page cover raster.
    #[serde(default = "default_cover_dpi")]
    pub cover_dpi: u32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            dpi: default_dpi(),
            cover_dpi: default_cover_dpi(),
        }
    }
}

fn default_dpi() -> u32 {
    300
}

fn default_cover_dpi() -> u32 {
    150
}

/// How archive entries are listed and extracted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveBackend {
    /// Spawn `7z` for every container.
    #[default]
    #[serde(rename = "7z")]
    SevenZip,
    /// Read ZIP containers in-process; RAR still goes through `7z`.
    Builtin,
}

/// Which program rasterizes PDF pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RasterizerKind {
    /// Ghostscript `png16m` device.
    #[default]
    Ghostscript,
    /// Poppler `pdftoppm`.
    Pdftoppm,
}

/// External tool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Archive accessor backend.
    #[serde(default)]
    pub archive_backend: ArchiveBackend,

    /// `7z` executable.
    #[serde(default = "default_seven_zip")]
    pub seven_zip: PathBuf,

    /// `pdfinfo` executable.
    #[serde(default = "default_pdfinfo")]
    pub pdfinfo: PathBuf,

    /// PDF rasterizer to use.
    #[serde(default)]
    pub rasterizer: RasterizerKind,

    /// Ghostscript executable.
    #[serde(default = "default_ghostscript")]
    pub ghostscript: PathBuf,

    /// `pdftoppm` executable.
    #[serde(default = "default_pdftoppm")]
    pub pdftoppm: PathBuf,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            archive_backend: ArchiveBackend::default(),
            seven_zip: default_seven_zip(),
            pdfinfo: default_pdfinfo(),
            rasterizer: RasterizerKind::default(),
            ghostscript: default_ghostscript(),
            pdftoppm: default_pdftoppm(),
        }
    }
}

fn default_seven_zip() -> PathBuf {
    PathBuf::from("7z")
}

fn default_pdfinfo() -> PathBuf {
    PathBuf::from("pdfinfo")
}

fn default_ghostscript() -> PathBuf {
    PathBuf::from("gs")
}

fn default_pdftoppm() -> PathBuf {
    PathBuf::from("pdftoppm")
}

/// Scan configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Rescan interval in seconds (0 to disable).
    #[serde(default)]
    pub interval_seconds: u64,

    /// Number of parallel workers for extraction (1 = sequential).
    /// Keep low for NAS/network storage to avoid saturation.
    #[serde(default = "default_scan_workers")]
    pub workers: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 0,
            workers: default_scan_workers(),
        }
    }
}

fn default_scan_workers() -> usize {
    1
}

/// Listing API configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Entries per listing page.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

fn default_page_size() -> usize {
    20
}

impl Config {
    /// Load configuration from file.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to read config file: {}", e))
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to parse config file: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the extraction pipeline cannot work with.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::AppError;

        if self.cache.thumbnail_size == 0 {
            return Err(AppError::Config("cache.thumbnail_size must be > 0".into()));
        }
        if self.cache.thumbnail_quality > 100 {
            return Err(AppError::Config(
                "cache.thumbnail_quality must be within 0-100".into(),
            ));
        }
        if self.render.dpi == 0 || self.render.cover_dpi == 0 {
            return Err(AppError::Config("render dpi values must be > 0".into()));
        }
        if self.api.page_size == 0 {
            return Err(AppError::Config("api.page_size must be > 0".into()));
        }
        Ok(())
    }

    /// Find config file in default locations.
    pub fn find_config_file() -> Option<PathBuf> {
        let candidates = [
            PathBuf::from("config.toml"),
            PathBuf::from("folio.toml"),
            dirs::config_dir()
                .map(|p| p.join("folio-rs").join("config.toml"))
                .unwrap_or_default(),
            PathBuf::from("/etc/folio-rs/config.toml"),
        ];

        candidates.into_iter().find(|p| p.exists())
    }

    /// Generate default config file content.
    pub fn generate_default() -> String {
        r#"# folio-rs configuration

[server]
bind = "0.0.0.0:8080"

[database]
# path = "/var/lib/folio-rs/library.db"

[library]
# Documents (.epub, .pdf, .cbz, .cbr) are discovered recursively
root = "books"

[cache]
# covers_dir = "/var/lib/folio-rs/covers"
thumbnail_size = 200
thumbnail_quality = 70

[render]
# DPI for PDF page reads and for the first-page cover raster
dpi = 300
cover_dpi = 150

[tools]
# "7z" or "builtin" (in-process ZIP; CBR still needs 7z)
archive_backend = "7z"
seven_zip = "7z"
pdfinfo = "pdfinfo"
# "ghostscript" or "pdftoppm"
rasterizer = "ghostscript"
ghostscript = "gs"
pdftoppm = "pdftoppm"

[scan]
# Rescan interval in seconds (0 to disable)
interval_seconds = 0
workers = 1

[api]
page_size = 20
"#
        .to_string()
    }
}

/// Supported container kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BookFormat {
    /// EPUB format (Electronic Publication).
    Epub,
    /// PDF format (Portable Document Format).
    Pdf,
    /// CBZ format (Comic Book ZIP archive).
    Cbz,
    /// CBR format (Comic Book RAR archive).
    Cbr,
}

impl BookFormat {
    /// Label stored in the catalog.
    pub fn as_str(&self) -> &'static str {
        match self {
            BookFormat::Epub => "EPUB",
            BookFormat::Pdf => "PDF",
            BookFormat::Cbz => "CBZ",
            BookFormat::Cbr => "CBR",
        }
    }

    /// Parse a catalog label or route segment, case-insensitively.
    pub fn parse(label: &str) -> Option<Self> {
        Self::from_extension(label)
    }

    /// Get the MIME type for this format.
    pub fn mime_type(&self) -> &'static str {
        match self {
            BookFormat::Epub => "application/epub+zip",
            BookFormat::Pdf => "application/pdf",
            BookFormat::Cbz => "application/vnd.comicbook+zip",
            BookFormat::Cbr => "application/vnd.comicbook-rar",
        }
    }

    /// Try to detect format from file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "epub" => Some(BookFormat::Epub),
            "pdf" => Some(BookFormat::Pdf),
            "cbz" => Some(BookFormat::Cbz),
            "cbr" => Some(BookFormat::Cbr),
            _ => None,
        }
    }

    /// Detect format from a document path.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Detect format from a document path, failing on unknown extensions.
    pub fn detect(path: &Path) -> crate::error::Result<Self> {
        Self::from_path(path).ok_or_else(|| {
            crate::error::AppError::UnsupportedFormat(path.display().to_string())
        })
    }
}

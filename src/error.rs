use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::fmt;
use thiserror::Error;

/// Extraction pipeline stage, attached to errors so failures can be logged precisely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Creating the thumbnail output directory.
    DirCreate,
    /// Listing container entries.
    List,
    /// Extracting a single container entry.
    Extract,
    /// Querying PDF document info.
    Info,
    /// Rasterizing a PDF page.
    Render,
    /// Decoding raster image bytes.
    Decode,
    /// Resizing to thumbnail dimensions.
    Resize,
    /// Encoding the thumbnail.
    Encode,
    /// Writing the thumbnail file.
    Write,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::DirCreate => "dir-create",
            Stage::List => "list",
            Stage::Extract => "extract",
            Stage::Info => "info",
            Stage::Render => "render",
            Stage::Decode => "decode",
            Stage::Resize => "resize",
            Stage::Encode => "encode",
            Stage::Write => "write",
        })
    }
}

/// Main error type for the application.
#[derive(Error, Debug)]
pub enum AppError {
    /// Container kind is not one of PDF, EPUB, CBZ or CBR.
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// External tool could not be spawned or exited unsuccessfully.
    #[error("{tool} failed: {message}")]
    Tool {
        /// Program name.
        tool: String,
        /// Exit status and captured diagnostics.
        message: String,
    },

    /// Document has no page that can be rendered.
    #[error("No renderable pages in {0}")]
    NoRenderablePages(String),

    /// Requested page is outside `1..=count`.
    #[error("Page {page} out of range (document has {count} pages)")]
    PageOutOfRange {
        /// Requested 1-based page.
        page: u32,
        /// Number of pages in the document.
        count: u32,
    },

    /// Image bytes are corrupt or in an unrecognized format.
    #[error("Failed to decode image: {0}")]
    Decode(String),

    /// Error tagged with the extraction stage it happened in.
    #[error("{stage}: {source}")]
    Extraction {
        /// Failing stage.
        stage: Stage,
        /// Underlying error.
        #[source]
        source: Box<AppError>,
    },

    /// Catalog and filesystem disagree about a path.
    #[error("Catalog entry missing for {0}")]
    StaleEntry(String),

    /// Resource not found error.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed request input.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Invalid container contents.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// ZIP archive error.
    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// XML parsing error.
    #[error("XML parsing error: {0}")]
    Xml(#[from] roxmltree::Error),

    /// Image processing error.
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Wrap this error with the stage it happened in.
    pub fn at(self, stage: Stage) -> Self {
        AppError::Extraction {
            stage,
            source: Box::new(self),
        }
    }

    /// Innermost stage tag, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            AppError::Extraction { stage, source } => source.stage().or(Some(*stage)),
            _ => None,
        }
    }

    /// The error without its stage tags.
    pub fn root(&self) -> &AppError {
        match self {
            AppError::Extraction { source, .. } => source.root(),
            other => other,
        }
    }

    fn status(&self) -> StatusCode {
        match self.root() {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_)
            | AppError::PageOutOfRange { .. }
            | AppError::NoRenderablePages(_)
            | AppError::UnsupportedFormat(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Tag the error of a `Result` with an extraction stage.
pub trait StageExt<T> {
    /// Convert the error and attach `stage`.
    fn stage(self, stage: Stage) -> Result<T>;
}

impl<T, E: Into<AppError>> StageExt<T> for std::result::Result<T, E> {
    fn stage(self, stage: Stage) -> Result<T> {
        self.map_err(|e| e.into().at(stage))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, stage = ?self.stage(), "Request error");
            // Tool output and internal details stay in the log.
            return (status, "Internal error").into_response();
        }

        tracing::debug!(error = %self, "Rejected request");
        (status, self.root().to_string()).into_response()
    }
}

/// Result type alias for the application.
pub type Result<T> = std::result::Result<T, AppError>;

//! HTTP request handlers.

use crate::config::BookFormat;
use crate::db::{CatalogEntry, ListQuery, Listing, SortKey, SortOrder};
use crate::error::{AppError, Result};
use crate::server::AppState;
use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio_util::io::ReaderStream;

/// Build a response, returning 500 on error (which shouldn't happen).
fn build_response(content_type: &str, cache: Option<&str>, body: impl Into<Body>) -> Response<Body> {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type);
    if let Some(cache) = cache {
        builder = builder.header(header::CACHE_CONTROL, cache);
    }

    builder.body(body.into()).unwrap_or_else(|_| {
        Response::builder()
            .status(StatusCode::INTERNAL_SERVER_ERROR)
            .body(Body::from("Internal error"))
            .unwrap_or_default()
    })
}

/// Run blocking extraction work off the async runtime.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Internal(format!("Task failed: {}", e)))?
}

/// Ensure a file exists, mapping absence to 404.
async fn require_file(path: &std::path::Path) -> Result<()> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        Ok(_) => Err(AppError::NotFound(path.display().to_string())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(AppError::NotFound(path.display().to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

fn parse_format(format: &str) -> Result<BookFormat> {
    BookFormat::parse(format).ok_or_else(|| AppError::UnsupportedFormat(format.to_string()))
}

// ============================================================================
// LISTING API
// ============================================================================

/// Sorting and paging query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    sort: Option<String>,
    order: Option<String>,
    page: Option<String>,
}

impl ListParams {
    /// Unknown or malformed values fall back to defaults.
    fn to_query(&self, page_size: usize) -> ListQuery {
        ListQuery {
            sort: self
                .sort
                .as_deref()
                .and_then(SortKey::parse)
                .unwrap_or_default(),
            order: self
                .order
                .as_deref()
                .and_then(SortOrder::parse)
                .unwrap_or_default(),
            page: self
                .page
                .as_deref()
                .and_then(|p| p.parse().ok())
                .filter(|p| *p >= 1)
                .unwrap_or(1),
            page_size,
        }
    }
}

/// Catalog entry as listed to clients.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookEntry {
    #[serde(rename = "type")]
    kind: String,
    path: String,
    cover: String,
    title: String,
    current_position: String,
    progress: f64,
}

/// A page of listed entries.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    books: Vec<BookEntry>,
    has_more: bool,
}

impl ListResponse {
    fn from_listing(state: &AppState, listing: Listing) -> Self {
        let books = listing
            .entries
            .into_iter()
            .map(|entry: CatalogEntry| BookEntry {
                kind: entry.format_label().to_string(),
                path: state.public_document_path(&entry.path),
                cover: state.public_cover_path(entry.cover_path.as_deref()),
                title: entry.title,
                current_position: entry.position,
                progress: entry.progress,
            })
            .collect();

        Self {
            books,
            has_more: listing.has_more,
        }
    }
}

/// API: List the whole catalog.
pub async fn api_all(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResponse>> {
    let query = params.to_query(state.config.api.page_size);
    let db = state.db.clone();
    let listing = blocking(move || db.list_entries(&query)).await?;
    Ok(Json(ListResponse::from_listing(&state, listing)))
}

/// Search query parameters.
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    q: String,
    #[serde(flatten)]
    list: ListParams,
}

/// Split a search string into a title prefix and required keywords.
///
/// Parts are comma separated; `#keyword` parts are keywords, the first other
/// part is the title prefix and the rest are ignored.
pub fn parse_search(q: &str) -> (Option<String>, Vec<String>) {
    let mut title = None;
    let mut keywords = Vec::new();

    for part in q.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if let Some(keyword) = part.strip_prefix('#') {
            keywords.push(keyword.to_string());
        } else if title.is_none() {
            title = Some(part.to_string());
        }
    }

    (title, keywords)
}

/// API: Search by title prefix and keywords.
pub async fn api_search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<ListResponse>> {
    let query = params.list.to_query(state.config.api.page_size);
    let (title, keywords) = parse_search(&params.q);

    let db = state.db.clone();
    let listing = blocking(move || db.search(title.as_deref(), &keywords, &query)).await?;
    Ok(Json(ListResponse::from_listing(&state, listing)))
}

/// Progress report parameters.
#[derive(Debug, Deserialize)]
pub struct ProgressParams {
    path: String,
    #[serde(default)]
    position: String,
    progress: Option<String>,
}

/// API: Record reading position and progress.
pub async fn api_progress(
    State(state): State<AppState>,
    Query(params): Query<ProgressParams>,
) -> Result<StatusCode> {
    let key = state.catalog_key(&params.path)?;
    let progress = params
        .progress
        .as_deref()
        .and_then(|p| p.parse::<f64>().ok())
        .unwrap_or(0.0);

    let db = state.db.clone();
    let found = blocking(move || db.update_progress(&key, &params.position, progress)).await?;
    if !found {
        return Err(AppError::NotFound(params.path));
    }
    Ok(StatusCode::OK)
}

/// Document path parameter.
#[derive(Debug, Deserialize)]
pub struct PathParams {
    path: String,
}

/// API: Mark a document as opened now.
pub async fn api_access(
    State(state): State<AppState>,
    Query(params): Query<PathParams>,
) -> Result<StatusCode> {
    let key = state.catalog_key(&params.path)?;

    let db = state.db.clone();
    let found = blocking(move || db.touch_last_opened(&key)).await?;
    if !found {
        return Err(AppError::NotFound(params.path));
    }
    Ok(StatusCode::OK)
}

/// Scan trigger response.
#[derive(Debug, Serialize)]
pub struct ScanResponse {
    started: bool,
}

/// API: Trigger library scan.
pub async fn api_scan(State(state): State<AppState>) -> (StatusCode, Json<ScanResponse>) {
    let started = state.start_background_scan();
    (StatusCode::ACCEPTED, Json(ScanResponse { started }))
}

// ============================================================================
// READING
// ============================================================================

/// Page count response.
#[derive(Debug, Serialize)]
pub struct PagesResponse {
    pages: u32,
}

/// Number of pages of a PDF or comic archive.
pub async fn book_pages(
    State(state): State<AppState>,
    Path(format): Path<String>,
    Query(params): Query<PathParams>,
) -> Result<Json<PagesResponse>> {
    let format = parse_format(&format)?;
    let file = state.document_path(&params.path)?;
    require_file(&file).await?;

    let toolkit = state.toolkit.clone();
    let pages = blocking(move || toolkit.page_count(format, &file)).await?;
    Ok(Json(PagesResponse { pages }))
}

/// Page read parameters.
#[derive(Debug, Deserialize)]
pub struct ReadParams {
    path: String,
    page: Option<String>,
}

/// One page image, or the whole file for EPUB.
pub async fn book_read(
    State(state): State<AppState>,
    Path(format): Path<String>,
    Query(params): Query<ReadParams>,
) -> Result<Response> {
    let format = parse_format(&format)?;
    let file = state.document_path(&params.path)?;
    require_file(&file).await?;

    if format == BookFormat::Epub {
        return stream_file(file, format.mime_type()).await;
    }

    let page = params
        .page
        .as_deref()
        .and_then(|p| p.parse::<u32>().ok())
        .ok_or_else(|| AppError::BadRequest("invalid page number".into()))?;

    let toolkit = state.toolkit.clone();
    let image = blocking(move || toolkit.fetch_page(format, &file, page)).await?;
    Ok(build_response(image.mime, None, image.data))
}

async fn stream_file(file: PathBuf, mime: &str) -> Result<Response> {
    let handle = tokio::fs::File::open(&file).await?;
    let length = handle.metadata().await?.len();
    let stream = ReaderStream::new(handle);

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, mime)
        .header(header::CONTENT_LENGTH, length)
        .body(Body::from_stream(stream))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()))
}

/// Serve a cached cover thumbnail.
pub async fn cover(State(state): State<AppState>, Path(path): Path<String>) -> Result<Response> {
    let file = state.cover_file(&path)?;
    require_file(&file).await?;

    let data = tokio::fs::read(&file).await?;
    Ok(build_response(
        "image/webp",
        Some("public, max-age=3600"),
        data,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_splits_title_and_keywords() {
        let (title, keywords) = parse_search(" dune , #scifi,#classics, ignored ,,");
        assert_eq!(title.as_deref(), Some("dune"));
        assert_eq!(keywords, vec!["scifi", "classics"]);

        let (title, keywords) = parse_search("");
        assert!(title.is_none());
        assert!(keywords.is_empty());
    }

    #[test]
    fn list_params_fall_back_to_defaults() {
        let params = ListParams {
            sort: Some("bogus".into()),
            order: Some("DESC".into()),
            page: Some("0".into()),
        };
        let query = params.to_query(20);
        assert_eq!(query.sort, SortKey::Title);
        assert_eq!(query.order, SortOrder::Desc);
        assert_eq!(query.page, 1);
        assert_eq!(query.page_size, 20);
    }
}

//! Presentation routes
//!
//! Static assets and themes from the web root, plus the meta/video/legal
//! pages rendered over finalized items. All read-only.

use std::path::PathBuf;

use axum::{
    body::Body,
    extract::{Path, State},
    http::header,
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use tokio_util::io::ReaderStream;

use crate::error::{AppError, Result};
use crate::mime;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/theme.js", get(theme_script))
        .route("/themes/:theme", get(theme))
        .route("/assets/:asset", get(asset))
        .route("/favicon.ico", get(favicon))
        .route("/legal", get(legal))
        .route("/t/:item_id", get(thumbnail))
        .route("/v/:item_id", get(video_page))
        .route("/:item_id", get(meta_page))
}

// ============================================================================
// Static assets
// ============================================================================

async fn index(State(state): State<AppState>) -> Result<Response> {
    serve_file(state.pages().web_root().join("index.html"), "text/html").await
}

async fn theme_script(State(state): State<AppState>) -> Result<Response> {
    serve_file(state.pages().web_root().join("theme.js"), "text/javascript").await
}

async fn theme(
    State(state): State<AppState>,
    Path(theme): Path<String>,
) -> Result<Response> {
    let name = sanitize_segment(&theme)?;
    serve_file(state.pages().web_root().join("themes").join(name), "text/css").await
}

async fn asset(
    State(state): State<AppState>,
    Path(asset): Path<String>,
) -> Result<Response> {
    let name = sanitize_segment(&asset)?;
    let extension = name.rsplit('.').next().unwrap_or("");
    let content_type = mime::content_type_for(extension);
    serve_file(state.pages().web_root().join("assets").join(name), content_type).await
}

async fn favicon(State(state): State<AppState>) -> Result<Response> {
    serve_file(state.pages().web_root().join("favicon.ico"), "image/x-icon").await
}

// ============================================================================
// Item pages
// ============================================================================

/// GET /:item_id — embed/redirect page for a finalized item.
async fn meta_page(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
) -> Result<Html<String>> {
    let (item, _) = state.uploads().retrieve(&item_id).await?;
    Ok(Html(state.pages().meta_page(&item)))
}

/// GET /v/:item_id — player page, video items only.
async fn video_page(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
) -> Result<Html<String>> {
    let (item, _) = state.uploads().retrieve(&item_id).await?;
    let html = state
        .pages()
        .video_page(&item)
        .await
        .ok_or_else(|| AppError::NotFound("Video site not found".to_string()))?;
    Ok(Html(html))
}

/// GET /t/:item_id — lazily extracted, cached video thumbnail.
async fn thumbnail(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
) -> Result<Response> {
    let (item, path) = state.uploads().retrieve(&item_id).await?;
    let thumbnail = state
        .media()
        .thumbnail(&item.id, &item.extension, &path)
        .await
        .ok_or_else(|| AppError::NotFound("No thumbnail for item".to_string()))?;
    serve_file(thumbnail, "image/jpeg").await
}

/// GET /legal
async fn legal(State(state): State<AppState>) -> Result<Html<String>> {
    let html = state
        .pages()
        .legal_page()
        .await
        .ok_or_else(|| AppError::NotFound("Legal site not found".to_string()))?;
    Ok(Html(html))
}

// ============================================================================
// Helpers
// ============================================================================

/// Reject path-traversal attempts in single-segment file names.
fn sanitize_segment(name: &str) -> Result<&str> {
    if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
        return Err(AppError::BadRequest("Invalid file name".to_string()));
    }
    Ok(name)
}

async fn serve_file(path: PathBuf, content_type: &'static str) -> Result<Response> {
    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppError::NotFound(format!(
                "{} not found",
                path.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            )))
        }
        Err(e) => return Err(e.into()),
    };

    let body = Body::from_stream(ReaderStream::new(file));
    let response = Response::builder()
        .header(header::CONTENT_TYPE, content_type)
        .body(body)
        .map_err(|e| AppError::Internal(e.to_string()))?;
    Ok(response.into_response())
}

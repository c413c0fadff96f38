//! Upload routes
//!
//! Request-per-operation HTTP binding over the upload engine. Every verb
//! maps 1:1 onto a registry/pipeline call:
//!
//! - POST /c/:extension (and /c/:extension/:name) - open a stream
//! - POST /u/:stream_id (and /u/:stream_id/:hash) - append a chunk
//! - POST /r/:stream_id - terminate a stream
//! - POST /f/:stream_id/:hash - finalize against the declared digest
//! - GET  /d/:item_id - download a finalized item

use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio_util::io::ReaderStream;

use crate::error::ErrorBody;
use crate::mime;
use crate::state::AppState;
use crate::upload::UploadError;

// ============================================================================
// Error response
// ============================================================================

impl IntoResponse for UploadError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (generic, field) = self.wire_code();

        if status.is_server_error() {
            tracing::error!("Upload error: {}", self);
        }

        let body = Json(ErrorBody::new(generic, field, self.to_string()));
        (status, body).into_response()
    }
}

// ============================================================================
// Router
// ============================================================================

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/c/:extension", post(open_stream))
        .route("/c/:extension/:name", post(open_named_stream))
        .route("/r/:stream_id", post(terminate_stream))
        .route("/u/:stream_id", post(append_chunk))
        .route("/u/:stream_id/:hash", post(append_chunk_checked))
        .route("/f/:stream_id/:hash", post(finish_stream))
        .route("/d/:item_id", get(download))
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Serialize)]
struct StreamOpened {
    stream: String,
}

#[derive(Serialize)]
struct OperationOk {
    success: bool,
}

#[derive(Serialize)]
struct Finalized {
    id: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /c/:extension
async fn open_stream(
    State(state): State<AppState>,
    Path(extension): Path<String>,
) -> Result<Json<StreamOpened>, UploadError> {
    let stream = state.uploads().create_stream(&extension, None).await?;
    Ok(Json(StreamOpened { stream }))
}

/// POST /c/:extension/:name
async fn open_named_stream(
    State(state): State<AppState>,
    Path((extension, name)): Path<(String, String)>,
) -> Result<Json<StreamOpened>, UploadError> {
    let stream = state.uploads().create_stream(&extension, Some(name)).await?;
    Ok(Json(StreamOpened { stream }))
}

/// POST /r/:stream_id
///
/// Termination is idempotent: an unknown or already removed id is still a
/// success, not an error.
async fn terminate_stream(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
) -> Json<OperationOk> {
    state.uploads().terminate(&stream_id).await;
    Json(OperationOk { success: true })
}

/// POST /u/:stream_id
async fn append_chunk(
    State(state): State<AppState>,
    Path(stream_id): Path<String>,
    body: Bytes,
) -> Result<Json<OperationOk>, UploadError> {
    let record = state
        .uploads()
        .registry()
        .lookup(&stream_id)
        .await
        .ok_or(UploadError::StreamNotFound(stream_id))?;

    state.uploads().append_chunk(&record, &body, None).await?;
    Ok(Json(OperationOk { success: true }))
}

/// POST /u/:stream_id/:hash
///
/// A mismatched chunk hash rejects the chunk without writing, so the
/// client may retry the same chunk.
async fn append_chunk_checked(
    State(state): State<AppState>,
    Path((stream_id, hash)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<OperationOk>, UploadError> {
    let record = state
        .uploads()
        .registry()
        .lookup(&stream_id)
        .await
        .ok_or(UploadError::StreamNotFound(stream_id))?;

    let accepted = state
        .uploads()
        .append_chunk(&record, &body, Some(&hash))
        .await?;
    if !accepted {
        return Err(UploadError::HashMismatch);
    }
    Ok(Json(OperationOk { success: true }))
}

/// POST /f/:stream_id/:hash
///
/// The sealed stream digest is compared against the digest the client
/// declares; a mismatch leaves the stream open for retry or termination.
async fn finish_stream(
    State(state): State<AppState>,
    Path((stream_id, hash)): Path<(String, String)>,
) -> Result<Json<Finalized>, UploadError> {
    let record = state
        .uploads()
        .registry()
        .lookup(&stream_id)
        .await
        .ok_or(UploadError::StreamNotFound(stream_id))?;

    let digest = state.uploads().seal_digest(&record).await?;
    if !digest.eq_ignore_ascii_case(&hash) {
        return Err(UploadError::HashMismatch);
    }

    let id = state.uploads().finalize(record).await?;
    Ok(Json(Finalized { id }))
}

/// GET /d/:item_id
async fn download(
    State(state): State<AppState>,
    Path(item_id): Path<String>,
) -> Result<Response, UploadError> {
    let (item, path) = state.uploads().retrieve(&item_id).await?;

    let file = tokio::fs::File::open(&path).await?;
    let body = Body::from_stream(ReaderStream::new(file));

    let response = Response::builder()
        .header(header::CONTENT_TYPE, mime::content_type_for(&item.extension))
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", item.download_name()),
        )
        .body(body)
        .map_err(|e| UploadError::Store(e.to_string()))?;

    Ok(response)
}

//! Looking up and delivering finished downloads.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tokio_util::io::ReaderStream;

use crate::downloads::DownloadOutcome;
use crate::web::error::WebError;
use crate::web::extract::RequireToken;
use crate::web::state::AppState;

#[derive(Debug, Serialize)]
pub struct DownloadResponse {
    pub success: bool,
    pub download_url: String,
    pub filename: String,
}

fn not_found() -> WebError {
    WebError::NotFound("Download not found".to_string())
}

fn not_available() -> WebError {
    WebError::NotFound("Download not available".to_string())
}

/// Link to an uploaded download.
pub async fn get_download(
    _token: RequireToken,
    State(state): State<AppState>,
    Path(download_id): Path<String>,
) -> Result<Json<DownloadResponse>, WebError> {
    let record = state.registry.get(&download_id).ok_or_else(not_found)?;
    match record.outcome {
        DownloadOutcome::Uploaded { download_url } => Ok(Json(DownloadResponse {
            success: true,
            download_url,
            filename: record.filename,
        })),
        DownloadOutcome::Fallback { .. } => Err(not_available()),
    }
}

/// Stream a download that never reached object storage, then forget it.
pub async fn download_file(
    _token: RequireToken,
    State(state): State<AppState>,
    Path(download_id): Path<String>,
) -> Result<Response, WebError> {
    if state.registry.get(&download_id).is_none() {
        return Err(not_found());
    }
    let record = state
        .registry
        .take_fallback(&download_id)
        .ok_or_else(not_available)?;
    let DownloadOutcome::Fallback { path } = record.outcome else {
        return Err(not_available());
    };

    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_available()),
        Err(e) => {
            return Err(WebError::Internal(format!(
                "Failed to open {}: {}",
                path.display(),
                e
            )))
        }
    };
    let length = file.metadata().await.ok().map(|m| m.len());

    // The open handle keeps the data readable after unlinking.
    if let Err(e) = tokio::fs::remove_file(&path).await {
        tracing::warn!(path = %path.display(), error = %e, "Failed to delete served fallback file");
    }
    tracing::info!(download_id = %download_id, filename = %record.filename, "Serving fallback file");

    let content_type = mime_guess::from_path(&record.filename)
        .first_or_octet_stream()
        .essence_str()
        .to_string();

    let mut response = Body::from_stream(ReaderStream::new(file)).into_response();
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&content_type) {
        headers.insert(header::CONTENT_TYPE, value);
    }
    if let Some(length) = length {
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    }
    if let Ok(value) = HeaderValue::from_str(&content_disposition(&record.filename)) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    Ok(response)
}

/// `attachment` with an ASCII fallback name and the RFC 5987 UTF-8 name.
fn content_disposition(filename: &str) -> String {
    let ascii: String = filename
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii,
        urlencoding::encode(filename)
    )
}

//! Format listing for a video URL.

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::extractor::{build_catalog, FormatCatalog};
use crate::web::error::WebError;
use crate::web::extract::RequireToken;
use crate::web::state::AppState;

#[derive(Debug, Deserialize)]
pub struct FetchFormatsRequest {
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct FetchFormatsResponse {
    pub success: bool,
    #[serde(flatten)]
    pub catalog: FormatCatalog,
}

pub async fn fetch_formats(
    _token: RequireToken,
    State(state): State<AppState>,
    payload: Result<Json<FetchFormatsRequest>, JsonRejection>,
) -> Result<Json<FetchFormatsResponse>, WebError> {
    state.activity.touch();

    let url = payload
        .ok()
        .and_then(|Json(req)| req.url)
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
        .ok_or_else(|| WebError::BadRequest("URL is required".to_string()))?;

    tracing::info!(url = %url, "Fetching formats");
    let info = state.extractor.fetch_info(&url).await?;
    let catalog = build_catalog(&info);
    tracing::debug!(
        title = %catalog.title,
        video = catalog.video_formats.len(),
        audio = catalog.audio_formats.len(),
        "Formats fetched"
    );

    Ok(Json(FetchFormatsResponse {
        success: true,
        catalog,
    }))
}

//! Cookie upload (admin) and status.

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    http::HeaderMap,
    Json,
};
use serde::Serialize;

use crate::auth::{check_admin_secret, AdminCheck, ADMIN_SECRET_HEADER};
use crate::cookies::CookieStatus;
use crate::web::error::WebError;
use crate::web::state::AppState;

/// Multipart field carrying the cookie file.
const COOKIES_FIELD: &str = "cookies";

#[derive(Debug, Serialize)]
pub struct UploadCookiesResponse {
    pub success: bool,
    pub message: &'static str,
    pub status: CookieStatus,
}

/// Replace the cookie file. Requires `X-Admin-Secret`.
pub async fn upload_cookies(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadCookiesResponse>, WebError> {
    let provided = headers
        .get(ADMIN_SECRET_HEADER)
        .and_then(|v| v.to_str().ok());
    match check_admin_secret(state.admin_secret.as_deref(), provided) {
        AdminCheck::Granted => {}
        AdminCheck::Disabled => {
            return Err(WebError::Forbidden(
                "Cookie upload is disabled: ADMIN_SECRET is not set".to_string(),
            ))
        }
        AdminCheck::Missing | AdminCheck::Mismatch => {
            tracing::warn!("Rejected cookie upload with missing or wrong admin secret");
            return Err(WebError::Unauthorized("Invalid admin secret".to_string()));
        }
    }

    let mut multipart = multipart?;
    let mut content = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| WebError::BadRequest(e.body_text()))?
    {
        if field.name() == Some(COOKIES_FIELD) {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| WebError::BadRequest(e.body_text()))?;
            content = Some(bytes);
            break;
        }
    }

    let bytes = content.ok_or_else(|| {
        WebError::BadRequest(format!("Missing '{}' file field", COOKIES_FIELD))
    })?;
    let status = state.cookies.store_upload(&bytes)?;
    state.activity.touch();

    Ok(Json(UploadCookiesResponse {
        success: true,
        message: "Cookies updated",
        status,
    }))
}

/// Public report on the cookie file. Never includes cookie values.
pub async fn cookie_status(State(state): State<AppState>) -> Json<CookieStatus> {
    Json(state.cookies.status())
}

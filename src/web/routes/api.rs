//! REST API route definitions.

use axum::{
    routing::{get, post},
    Router,
};

use crate::web::handlers::{cookies, downloads, formats, tokens};
use crate::web::state::AppState;

/// Build the API router with all REST endpoints.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/request_token", post(tokens::request_token))
        .route("/fetch_formats", post(formats::fetch_formats))
        // Download routes
        .route("/download/{id}", get(downloads::get_download))
        .route("/download/{id}/file", get(downloads::download_file))
        // Cookie routes
        .route("/upload_cookies", post(cookies::upload_cookies))
        .route("/cookie_status", get(cookies::cookie_status))
}

//! Liveness endpoints.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::web::state::AppState;

#[derive(Debug, Serialize)]
pub struct RootResponse {
    pub status: &'static str,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub idle_minutes: f64,
    pub cookies_active: bool,
}

pub async fn root() -> Json<RootResponse> {
    Json(RootResponse { status: "online" })
}

/// Always 200; reports idle time and whether cookies are in use.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "online",
        idle_minutes: state.activity.idle_minutes(),
        cookies_active: state.cookies.is_active(),
    })
}

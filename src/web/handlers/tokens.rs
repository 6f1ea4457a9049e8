//! One-time request token issuance.

use axum::{extract::State, Json};
use serde::Serialize;

use crate::web::error::WebError;
use crate::web::extract::ClientIp;
use crate::web::state::AppState;

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub success: bool,
    pub token: String,
    /// Seconds until the token expires
    pub expires_in: u64,
}

/// Issue a token for the calling IP.
///
/// Also purges expired tokens and download records.
pub async fn request_token(
    State(state): State<AppState>,
    ClientIp(client_ip): ClientIp,
) -> Result<Json<TokenResponse>, WebError> {
    state.activity.touch();
    state.tokens.purge_expired();
    state.registry.purge_expired();

    let issued = state.tokens.issue(&client_ip)?;
    Ok(Json(TokenResponse {
        success: true,
        token: issued.token,
        expires_in: issued.expires_in.as_secs(),
    }))
}

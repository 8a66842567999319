use axum::{extract::State, response::IntoResponse, Json};
use bytes::Bytes;

use crate::{
    errors::{ApiError, ApiResult},
    state::AppState,
    token::{CredentialsUpdate, TokenManager},
    utils::mask_token,
};

pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let tokens = TokenManager::load(&state).await;
    let creds = tokens.credentials();
    Json(serde_json::json!({
        "has_credentials": creds.has_refresh_grant(),
        "has_access_token": creds.access_token.as_deref().is_some_and(|t| !t.is_empty()),
        "token_expiry": creds.expires_at.map(|t| t.to_rfc3339()),
    }))
}

pub async fn update(State(state): State<AppState>, body: Bytes) -> ApiResult<impl IntoResponse> {
    let update: CredentialsUpdate = serde_json::from_slice(&body)
        .map_err(|e| ApiError::Validation(format!("Credentials body is not valid JSON: {e}")))?;
    if update.is_empty() {
        return Err(ApiError::Validation(
            "No credential fields supplied; expected any of client_id, client_secret, refresh_token, access_token, expires_in, profile_arn".to_string(),
        ));
    }

    let mut tokens = TokenManager::load(&state).await;
    tokens.set_credentials(update).await?;

    Ok(Json(serde_json::json!({
        "message": "Credentials updated",
        "has_profile_arn": tokens.credentials().profile_arn.is_some(),
    })))
}

pub async fn refresh(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let mut tokens = TokenManager::load(&state).await;
    let token = tokens.refresh().await?;
    Ok(Json(serde_json::json!({
        "message": "Access token refreshed",
        "token_preview": mask_token(&token),
        "token_length": token.len(),
        "expires_at": tokens.credentials().expires_at.map(|t| t.to_rfc3339()),
    })))
}

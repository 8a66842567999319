use axum::{extract::State, response::IntoResponse, Json};

use crate::{state::AppState, token_store::Credentials};

pub async fn root(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "message": "Amazon Q to OpenAI/Anthropic API bridge",
        "version": env!("CARGO_PKG_VERSION"),
        "auth_method": "OAuth 2.0",
        "endpoints": {
            "openai_chat": "/v1/chat/completions",
            "anthropic_messages": "/v1/messages",
            "models": "/v1/models",
            "credentials": "/credentials",
            "health": "/health",
        },
        "default_model": state.config.default_model,
    }))
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let has_credentials = match state.store.load().await {
        Ok(Some(creds)) => has_refresh_token(&creds),
        Ok(None) => state.config.credentials.refresh_token.as_deref().is_some_and(|t| !t.is_empty()),
        Err(err) => {
            tracing::warn!("Health check could not read credentials: {}", err);
            false
        }
    };

    Json(serde_json::json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "has_credentials": has_credentials,
    }))
}

fn has_refresh_token(creds: &Credentials) -> bool {
    !creds.refresh_token.is_empty()
}

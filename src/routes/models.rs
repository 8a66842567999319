use axum::{response::IntoResponse, Json};

use crate::utils::unix_now;

const SUPPORTED_MODELS: &[(&str, &str)] = &[
    ("claude-sonnet-4.5", "anthropic"),
    ("claude-sonnet-4", "anthropic"),
    ("amazon-q", "amazon"),
];

/// Upstream model id for a public model name; unknown names get the default.
pub fn resolve_model_id(model: &str) -> &'static str {
    match model {
        "claude-sonnet-4" => "claude-sonnet-4",
        _ => "claude-sonnet-4.5",
    }
}

pub async fn list() -> impl IntoResponse {
    let created = unix_now();
    let data: Vec<serde_json::Value> = SUPPORTED_MODELS
        .iter()
        .map(|(id, owner)| {
            serde_json::json!({
                "id": id,
                "object": "model",
                "created": created,
                "owned_by": owner,
            })
        })
        .collect();

    Json(serde_json::json!({
        "object": "list",
        "data": data,
    }))
}

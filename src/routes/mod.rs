use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::state::AppState;

pub mod chat_completions;
pub mod credentials;
pub mod messages;
pub mod misc;
pub mod models;
pub mod relay;
pub mod streaming;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(misc::root))
        .route("/health", get(misc::health))
        .route("/v1/models", get(models::list))
        .route("/v1/chat/completions", post(chat_completions::handle))
        .route("/v1/messages", post(messages::handle))
        .route("/credentials", get(credentials::status).post(credentials::update))
        .route("/credentials/refresh", post(credentials::refresh))
        .with_state(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
}

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::Response,
};
use bytes::Bytes;

use crate::{errors::ApiResult, routes::relay::relay, state::AppState, stream_mode::Protocol};

pub async fn handle(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    relay(state, Protocol::OpenAi, query, headers, body).await
}

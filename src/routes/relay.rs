use std::collections::HashMap;

use axum::{
    http::{HeaderMap, HeaderName, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use uuid::Uuid;

use crate::{
    config::ANTHROPIC_VERSION,
    errors::{ApiError, ApiResult},
    framing::collect_fragments,
    routes::{models::resolve_model_id, streaming::relay_sse},
    services::amazonq::AmazonQClient,
    state::AppState,
    stream_mode::{resolve_streaming, ChatRequest, Protocol},
    token::TokenManager,
    translator::{anthropic_message, anthropic_message_id, openai_chat_id, openai_completion, AnthropicEmitter, OpenAiEmitter},
    utils::truncate_for_log,
};

/// Shared body of both chat endpoints: normalize, call upstream once, translate.
pub async fn relay(
    state: AppState,
    protocol: Protocol,
    query: HashMap<String, String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    let config = state.config.clone();
    let logging = &config.logging;

    let body: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::Validation(format!("Request body is not valid JSON: {e}")))?;
    if logging.log_requests {
        tracing::info!(
            ?protocol,
            "Received request: {}",
            truncate_for_log(&body.to_string(), logging.max_log_length)
        );
    }

    let request = ChatRequest::from_value(&body)?;
    let streaming = resolve_streaming(protocol, &body, &query, &headers);
    let model = request
        .model
        .clone()
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| config.default_model.clone());
    let text = request.last_user_text();
    let conversation_id = Uuid::new_v4().to_string();

    tracing::debug!(%conversation_id, streaming, %model, "Relaying user turn of {} bytes", text.len());

    let mut tokens = TokenManager::load(&state).await;
    let client = AmazonQClient::new(&state.client, &config);
    let resp = client
        .send_message(&mut tokens, &text, &conversation_id, resolve_model_id(&model))
        .await?;
    drop(tokens);

    let cap = config.performance.buffer_max_size;
    if streaming {
        let upstream = resp.bytes_stream();
        let response = match protocol {
            Protocol::OpenAi => {
                let emitter = OpenAiEmitter::new(openai_chat_id(&conversation_id), model);
                relay_sse(upstream, emitter, cap, logging.log_responses)
            }
            Protocol::Anthropic => {
                let emitter = AnthropicEmitter::new(anthropic_message_id(), model);
                with_anthropic_headers(relay_sse(upstream, emitter, cap, logging.log_responses))
            }
        };
        return Ok(response);
    }

    let raw = resp
        .text()
        .await
        .map_err(|e| ApiError::UpstreamUnavailable(format!("Failed to read Amazon Q response: {e}")))?;
    let reply = collect_fragments(&raw);
    if logging.log_responses {
        tracing::info!(
            "Non-streaming reply ({} bytes upstream): {}",
            raw.len(),
            truncate_for_log(&reply, logging.max_log_length)
        );
    }

    let response = match protocol {
        Protocol::OpenAi => Json(openai_completion(&openai_chat_id(&conversation_id), &model, &reply)).into_response(),
        Protocol::Anthropic => {
            with_anthropic_headers(Json(anthropic_message(&anthropic_message_id(), &model, &reply)).into_response())
        }
    };
    Ok(response)
}

fn with_anthropic_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        HeaderName::from_static("anthropic-version"),
        HeaderValue::from_static(ANTHROPIC_VERSION),
    );
    if let Ok(value) = HeaderValue::from_str(&format!("req_{}", Uuid::new_v4().simple())) {
        headers.insert(HeaderName::from_static("request-id"), value);
    }
    response
}

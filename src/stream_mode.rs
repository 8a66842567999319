use std::collections::HashMap;

use axum::http::{header, HeaderMap};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::errors::{ApiError, ApiResult};

/// Which public wire format the caller speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    OpenAi,
    Anthropic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFlag {
    Unset,
    True,
    False,
}

impl StreamFlag {
    fn definite(self) -> Option<bool> {
        match self {
            StreamFlag::True => Some(true),
            StreamFlag::False => Some(false),
            StreamFlag::Unset => None,
        }
    }
}

const TRUTHY: &[&str] = &["true", "1", "yes", "on", "sse", "stream", "delta"];
const FALSY: &[&str] = &["false", "0", "no", "off"];
const NESTED_KEYS: &[&str] = &["type", "mode", "format", "value", "enabled"];
const ALTERNATE_BODY_KEYS: &[&str] = &["response_mode", "responseMode", "response_format", "responseFormat"];
const CLIENT_HINT_HEADERS: &[&str] = &["user-agent", "x-client-app", "x-app-name", "x-request-client"];

// Interactive IDE clients that expect SSE even when they omit `stream`.
static IDE_CLIENT_HINT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:cursor|vscode|vs code|visual studio code|jetbrains|intellij|pycharm|windsurf|cline|roo-?code|kilo-?code|continue\.dev|claude-code|claude-cli)\b")
        .expect("static client hint pattern")
});

pub fn normalize_stream_flag(value: &Value) -> StreamFlag {
    match value {
        Value::Bool(true) => StreamFlag::True,
        Value::Bool(false) => StreamFlag::False,
        Value::Number(n) => match n.as_f64() {
            Some(f) if f == 0.0 => StreamFlag::False,
            Some(_) => StreamFlag::True,
            None => StreamFlag::Unset,
        },
        Value::String(s) => normalize_token(s),
        Value::Object(map) => NESTED_KEYS
            .iter()
            .filter_map(|key| map.get(*key))
            .map(normalize_stream_flag)
            .find(|flag| *flag != StreamFlag::Unset)
            .unwrap_or(StreamFlag::Unset),
        Value::Null | Value::Array(_) => StreamFlag::Unset,
    }
}

fn normalize_token(raw: &str) -> StreamFlag {
    let token = raw.trim().to_ascii_lowercase();
    if TRUTHY.contains(&token.as_str()) {
        StreamFlag::True
    } else if FALSY.contains(&token.as_str()) {
        StreamFlag::False
    } else {
        StreamFlag::Unset
    }
}

/// Decides whether the reply is streamed. First definite signal wins:
/// body `stream`, query `stream`, alternate body keys, the Anthropic
/// default, an SSE `Accept` header, then IDE client hints.
pub fn resolve_streaming(
    protocol: Protocol,
    body: &Value,
    query: &HashMap<String, String>,
    headers: &HeaderMap,
) -> bool {
    if let Some(stream) = body.get("stream").and_then(|v| normalize_stream_flag(v).definite()) {
        return stream;
    }

    if let Some(stream) = query.get("stream").and_then(|v| normalize_token(v).definite()) {
        return stream;
    }

    for key in ALTERNATE_BODY_KEYS {
        if let Some(stream) = body.get(*key).and_then(|v| normalize_stream_flag(v).definite()) {
            return stream;
        }
    }

    if protocol == Protocol::Anthropic {
        return true;
    }

    let accepts_sse = headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.to_ascii_lowercase().contains("text/event-stream"));
    if accepts_sse {
        return true;
    }

    has_ide_client_hint(headers)
}

fn has_ide_client_hint(headers: &HeaderMap) -> bool {
    CLIENT_HINT_HEADERS
        .iter()
        .filter_map(|name| headers.get(*name))
        .filter_map(|v| v.to_str().ok())
        .any(|v| IDE_CLIENT_HINT.is_match(v))
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: MessageContent,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
    Other(Value),
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::Other(Value::Null)
    }
}

#[derive(Debug, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

impl ChatRequest {
    pub fn from_value(body: &Value) -> ApiResult<Self> {
        let request = ChatRequest::deserialize(body)
            .map_err(|e| ApiError::Validation(format!("Invalid request body: {e}")))?;
        if request.messages.is_empty() {
            return Err(ApiError::Validation("messages must not be empty".to_string()));
        }
        Ok(request)
    }

    /// Text of the most recent user turn; earlier history is not relayed.
    pub fn last_user_text(&self) -> String {
        let Some(message) = self.messages.iter().rev().find(|m| m.role == "user") else {
            return String::new();
        };
        match &message.content {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter(|b| b.kind == "text")
                .filter_map(|b| b.text.as_deref())
                .collect::<Vec<_>>()
                .join(" "),
            MessageContent::Other(_) => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::http::{HeaderMap, HeaderValue};
    use serde_json::json;

    use super::{normalize_stream_flag, resolve_streaming, ChatRequest, Protocol, StreamFlag};
    use crate::errors::ApiError;

    fn no_query() -> HashMap<String, String> {
        HashMap::new()
    }

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).expect("header value"));
        }
        map
    }

    #[test]
    fn normalizes_primitives_and_tokens() {
        assert_eq!(normalize_stream_flag(&json!(true)), StreamFlag::True);
        assert_eq!(normalize_stream_flag(&json!(false)), StreamFlag::False);
        assert_eq!(normalize_stream_flag(&json!(1)), StreamFlag::True);
        assert_eq!(normalize_stream_flag(&json!(0)), StreamFlag::False);
        for token in ["true", "1", "YES", "on", " sse ", "stream", "delta"] {
            assert_eq!(normalize_stream_flag(&json!(token)), StreamFlag::True, "{token}");
        }
        for token in ["false", "0", "No", "off"] {
            assert_eq!(normalize_stream_flag(&json!(token)), StreamFlag::False, "{token}");
        }
        assert_eq!(normalize_stream_flag(&json!("maybe")), StreamFlag::Unset);
        assert_eq!(normalize_stream_flag(&json!(null)), StreamFlag::Unset);
        assert_eq!(normalize_stream_flag(&json!([true])), StreamFlag::Unset);
    }

    #[test]
    fn normalizes_nested_objects_in_key_order() {
        assert_eq!(normalize_stream_flag(&json!({"type": "sse"})), StreamFlag::True);
        assert_eq!(normalize_stream_flag(&json!({"type": "json_object"})), StreamFlag::Unset);
        assert_eq!(
            normalize_stream_flag(&json!({"type": "text", "mode": {"enabled": false}, "value": true})),
            StreamFlag::False
        );
        assert_eq!(normalize_stream_flag(&json!({"other": true})), StreamFlag::Unset);
    }

    #[test]
    fn body_flag_overrides_anthropic_default() {
        let body = json!({"stream": false});
        assert!(!resolve_streaming(Protocol::Anthropic, &body, &no_query(), &HeaderMap::new()));
    }

    #[test]
    fn anthropic_defaults_to_streaming() {
        assert!(resolve_streaming(Protocol::Anthropic, &json!({}), &no_query(), &HeaderMap::new()));
    }

    #[test]
    fn openai_defaults_to_non_streaming() {
        assert!(!resolve_streaming(Protocol::OpenAi, &json!({}), &no_query(), &HeaderMap::new()));
    }

    #[test]
    fn query_flag_beats_alternate_keys() {
        let mut query = HashMap::new();
        query.insert("stream".to_string(), "off".to_string());
        let body = json!({"response_mode": "stream"});
        assert!(!resolve_streaming(Protocol::OpenAi, &body, &query, &HeaderMap::new()));

        query.insert("stream".to_string(), "whatever".to_string());
        assert!(resolve_streaming(Protocol::OpenAi, &body, &query, &HeaderMap::new()));
    }

    #[test]
    fn unset_body_flag_falls_through() {
        let mut query = HashMap::new();
        query.insert("stream".to_string(), "1".to_string());
        let body = json!({"stream": "auto"});
        assert!(resolve_streaming(Protocol::OpenAi, &body, &query, &HeaderMap::new()));
    }

    #[test]
    fn alternate_keys_checked_in_order() {
        let body = json!({"responseFormat": {"type": "sse"}, "response_format": {"type": "json_object"}, "responseMode": "no"});
        assert!(!resolve_streaming(Protocol::OpenAi, &body, &no_query(), &HeaderMap::new()));
        let body = json!({"responseFormat": {"type": "sse"}, "response_format": {"type": "json_object"}});
        assert!(resolve_streaming(Protocol::OpenAi, &body, &no_query(), &HeaderMap::new()));
    }

    #[test]
    fn alternate_key_false_beats_anthropic_default() {
        let body = json!({"response_mode": "off"});
        assert!(!resolve_streaming(Protocol::Anthropic, &body, &no_query(), &HeaderMap::new()));
    }

    #[test]
    fn accept_header_forces_openai_streaming() {
        let h = headers(&[("accept", "application/json, text/event-stream")]);
        assert!(resolve_streaming(Protocol::OpenAi, &json!({}), &no_query(), &h));
        // an explicit body flag still wins
        assert!(!resolve_streaming(Protocol::OpenAi, &json!({"stream": false}), &no_query(), &h));
    }

    #[test]
    fn ide_client_hints_force_streaming() {
        let h = headers(&[("user-agent", "Mozilla/5.0 Cursor/0.42")]);
        assert!(resolve_streaming(Protocol::OpenAi, &json!({}), &no_query(), &h));
        let h = headers(&[("x-client-app", "JetBrains-AI")]);
        assert!(resolve_streaming(Protocol::OpenAi, &json!({}), &no_query(), &h));
        let h = headers(&[("user-agent", "curl/8.4.0")]);
        assert!(!resolve_streaming(Protocol::OpenAi, &json!({}), &no_query(), &h));
    }

    #[test]
    fn client_hints_match_whole_words_only() {
        let h = headers(&[("user-agent", "Cline/3.1 (vscode)")]);
        assert!(resolve_streaming(Protocol::OpenAi, &json!({}), &no_query(), &h));
        for agent in ["incline-monitor/1.0", "precursor-bot/2", "ClineRunner"] {
            let h = headers(&[("user-agent", agent)]);
            assert!(!resolve_streaming(Protocol::OpenAi, &json!({}), &no_query(), &h), "{agent}");
        }
    }

    #[test]
    fn extracts_last_user_string_content() {
        let body = json!({
            "model": "claude-sonnet-4",
            "messages": [
                {"role": "user", "content": "first"},
                {"role": "assistant", "content": "reply"},
                {"role": "user", "content": "Hello!"},
                {"role": "assistant", "content": "trailing"}
            ]
        });
        let request = ChatRequest::from_value(&body).expect("request");
        assert_eq!(request.model.as_deref(), Some("claude-sonnet-4"));
        assert_eq!(request.last_user_text(), "Hello!");
    }

    #[test]
    fn joins_text_blocks_only() {
        let body = json!({
            "messages": [{"role": "user", "content": [
                {"type": "text", "text": "look at"},
                {"type": "image", "source": {"data": "abcd"}},
                {"type": "text", "text": "this"}
            ]}]
        });
        let request = ChatRequest::from_value(&body).expect("request");
        assert_eq!(request.last_user_text(), "look at this");
    }

    #[test]
    fn no_user_turn_yields_empty_text() {
        let body = json!({"messages": [{"role": "system", "content": "be nice"}]});
        assert_eq!(ChatRequest::from_value(&body).expect("request").last_user_text(), "");
    }

    #[test]
    fn empty_or_missing_messages_rejected() {
        assert!(matches!(ChatRequest::from_value(&json!({"messages": []})), Err(ApiError::Validation(_))));
        assert!(matches!(ChatRequest::from_value(&json!({"model": "x"})), Err(ApiError::Validation(_))));
        assert!(matches!(ChatRequest::from_value(&json!({"messages": "nope"})), Err(ApiError::Validation(_))));
    }
}

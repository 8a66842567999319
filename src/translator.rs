use bytes::Bytes;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::utils::unix_now;

pub fn openai_completion(id: &str, model: &str, text: &str) -> Value {
    json!({
        "id": id,
        "object": "chat.completion",
        "created": unix_now(),
        "model": model,
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": text,
            },
            "finish_reason": "stop",
        }],
        "usage": {
            "prompt_tokens": 0,
            "completion_tokens": 0,
            "total_tokens": 0,
        },
    })
}

pub fn anthropic_message(id: &str, model: &str, text: &str) -> Value {
    json!({
        "id": id,
        "type": "message",
        "role": "assistant",
        "content": [{ "type": "text", "text": text }],
        "model": model,
        "stop_reason": "end_turn",
        "stop_sequence": null,
        "usage": { "input_tokens": 0, "output_tokens": 0 },
    })
}

pub fn openai_chat_id(conversation_id: &str) -> String {
    let short: String = conversation_id.chars().take(8).collect();
    format!("chatcmpl-{}", short)
}

pub fn anthropic_message_id() -> String {
    format!("msg_{}", Uuid::new_v4().simple())
}

fn data_frame(payload: &Value) -> Bytes {
    Bytes::from(format!("data: {}\n\n", payload))
}

fn event_frame(name: &str, payload: &Value) -> Bytes {
    Bytes::from(format!("event: {}\ndata: {}\n\n", name, payload))
}

/// Turns the upstream fragment sequence into one public SSE dialect.
///
/// Call order is `start`, any number of `delta`, then `finish`; `error`
/// replaces `finish` when the upstream breaks mid-stream.
pub trait SseEmitter {
    fn start(&mut self) -> Vec<Bytes>;
    fn delta(&mut self, fragment: &str) -> Vec<Bytes>;
    fn finish(&mut self) -> Vec<Bytes>;
    fn error(&mut self, message: &str) -> Bytes;
}

#[derive(Debug)]
pub struct OpenAiEmitter {
    id: String,
    model: String,
    created: u64,
}

impl OpenAiEmitter {
    pub fn new(id: String, model: String) -> Self {
        Self {
            id,
            model,
            created: unix_now(),
        }
    }

    fn chunk(&self, delta: Value, finish_reason: Option<&str>) -> Value {
        json!({
            "id": self.id,
            "object": "chat.completion.chunk",
            "created": self.created,
            "model": self.model,
            "choices": [{
                "index": 0,
                "delta": delta,
                "finish_reason": finish_reason,
            }],
        })
    }
}

impl SseEmitter for OpenAiEmitter {
    fn start(&mut self) -> Vec<Bytes> {
        vec![data_frame(&self.chunk(json!({ "role": "assistant", "content": "" }), None))]
    }

    fn delta(&mut self, fragment: &str) -> Vec<Bytes> {
        vec![data_frame(&self.chunk(json!({ "content": fragment }), None))]
    }

    fn finish(&mut self) -> Vec<Bytes> {
        vec![
            data_frame(&self.chunk(json!({}), Some("stop"))),
            Bytes::from_static(b"data: [DONE]\n\n"),
        ]
    }

    fn error(&mut self, message: &str) -> Bytes {
        data_frame(&json!({
            "error": {
                "message": message,
                "type": "stream_error",
            }
        }))
    }
}

#[derive(Debug)]
pub struct AnthropicEmitter {
    id: String,
    model: String,
    // `message_stop` repeats the whole reply.
    text: String,
}

impl AnthropicEmitter {
    pub fn new(id: String, model: String) -> Self {
        Self {
            id,
            model,
            text: String::new(),
        }
    }
}

impl SseEmitter for AnthropicEmitter {
    fn start(&mut self) -> Vec<Bytes> {
        vec![
            event_frame("message_start", &json!({
                "type": "message_start",
                "message": {
                    "id": self.id,
                    "type": "message",
                    "role": "assistant",
                    "content": [],
                    "model": self.model,
                    "stop_reason": null,
                    "stop_sequence": null,
                    "usage": { "input_tokens": 0, "output_tokens": 0 },
                }
            })),
            event_frame("content_block_start", &json!({
                "type": "content_block_start",
                "index": 0,
                "content_block": { "type": "text", "text": "" },
            })),
        ]
    }

    fn delta(&mut self, fragment: &str) -> Vec<Bytes> {
        self.text.push_str(fragment);
        vec![event_frame("content_block_delta", &json!({
            "type": "content_block_delta",
            "index": 0,
            "delta": { "type": "text_delta", "text": fragment },
        }))]
    }

    fn finish(&mut self) -> Vec<Bytes> {
        vec![
            event_frame("content_block_stop", &json!({ "type": "content_block_stop", "index": 0 })),
            event_frame("message_delta", &json!({
                "type": "message_delta",
                "delta": { "stop_reason": "end_turn", "stop_sequence": null },
                "usage": { "output_tokens": 0 },
            })),
            event_frame("message_stop", &json!({
                "type": "message_stop",
                "message": anthropic_message(&self.id, &self.model, &self.text),
            })),
        ]
    }

    fn error(&mut self, message: &str) -> Bytes {
        event_frame("error", &json!({
            "type": "error",
            "error": {
                "type": "api_error",
                "message": message,
            }
        }))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use bytes::Bytes;

    use super::{
        anthropic_message, event_frame, openai_chat_id, openai_completion, AnthropicEmitter, OpenAiEmitter,
        SseEmitter,
    };

    /// Splits SSE output into `(event name, data json)` pairs.
    pub(crate) fn parse_frames(raw: &str) -> Vec<(Option<String>, String)> {
        raw.split("\n\n")
            .filter(|block| !block.trim().is_empty())
            .map(|block| {
                let mut event = None;
                let mut data = Vec::new();
                for line in block.lines() {
                    if let Some(name) = line.strip_prefix("event: ") {
                        event = Some(name.to_string());
                    } else if let Some(d) = line.strip_prefix("data: ") {
                        data.push(d);
                    }
                }
                (event, data.join("\n"))
            })
            .collect()
    }

    fn run(emitter: &mut dyn SseEmitter, fragments: &[&str]) -> String {
        let mut frames: Vec<Bytes> = emitter.start();
        for f in fragments {
            frames.extend(emitter.delta(f));
        }
        frames.extend(emitter.finish());
        frames.iter().map(|b| String::from_utf8_lossy(b).to_string()).collect()
    }

    #[test]
    fn openai_sequence_is_start_content_end_done() {
        let mut emitter = OpenAiEmitter::new("chatcmpl-abc".to_string(), "claude-sonnet-4.5".to_string());
        let frames = parse_frames(&run(&mut emitter, &["He", "llo"]));
        assert_eq!(frames.len(), 5);
        assert!(frames.iter().all(|(event, _)| event.is_none()));

        let chunks: Vec<serde_json::Value> = frames[..4]
            .iter()
            .map(|(_, d)| serde_json::from_str(d).expect("chunk json"))
            .collect();
        assert_eq!(chunks[0]["choices"][0]["delta"]["role"], "assistant");
        assert_eq!(chunks[0]["choices"][0]["delta"]["content"], "");
        assert_eq!(chunks[1]["choices"][0]["delta"]["content"], "He");
        assert_eq!(chunks[2]["choices"][0]["delta"]["content"], "llo");
        assert_eq!(chunks[3]["choices"][0]["finish_reason"], "stop");
        assert!(chunks.iter().all(|c| c["id"] == "chatcmpl-abc" && c["object"] == "chat.completion.chunk"));
        assert_eq!(frames[4].1, "[DONE]");
    }

    #[test]
    fn anthropic_sequence_echoes_full_text() {
        let mut emitter = AnthropicEmitter::new("msg_1".to_string(), "claude-sonnet-4.5".to_string());
        let frames = parse_frames(&run(&mut emitter, &["He", "llo"]));
        let names: Vec<&str> = frames.iter().map(|(e, _)| e.as_deref().unwrap_or("")).collect();
        assert_eq!(
            names,
            vec![
                "message_start",
                "content_block_start",
                "content_block_delta",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );

        let data: Vec<serde_json::Value> = frames.iter().map(|(_, d)| serde_json::from_str(d).expect("json")).collect();
        assert_eq!(data[0]["message"]["id"], "msg_1");
        assert_eq!(data[2]["delta"]["type"], "text_delta");
        assert_eq!(data[3]["delta"]["text"], "llo");
        assert_eq!(data[5]["delta"]["stop_reason"], "end_turn");
        assert_eq!(data[6]["message"]["id"], "msg_1");
        assert_eq!(data[6]["message"]["content"][0]["text"], "Hello");
    }

    #[test]
    fn error_frames_match_dialect() {
        let mut openai = OpenAiEmitter::new("id".to_string(), "m".to_string());
        let frame = String::from_utf8_lossy(&openai.error("boom")).to_string();
        let parsed = parse_frames(&frame);
        assert_eq!(parsed[0].0, None);
        let json: serde_json::Value = serde_json::from_str(&parsed[0].1).expect("json");
        assert_eq!(json["error"]["type"], "stream_error");

        let mut anthropic = AnthropicEmitter::new("id".to_string(), "m".to_string());
        let frame = String::from_utf8_lossy(&anthropic.error("boom")).to_string();
        let parsed = parse_frames(&frame);
        assert_eq!(parsed[0].0.as_deref(), Some("error"));
    }

    #[test]
    fn envelopes_report_zero_usage() {
        let openai = openai_completion("chatcmpl-1", "claude-sonnet-4", "Hi there!");
        assert_eq!(openai["object"], "chat.completion");
        assert_eq!(openai["choices"][0]["message"]["content"], "Hi there!");
        assert_eq!(openai["choices"][0]["finish_reason"], "stop");
        assert_eq!(openai["usage"]["total_tokens"], 0);

        let anthropic = anthropic_message("msg_1", "claude-sonnet-4", "Hi there!");
        assert_eq!(anthropic["type"], "message");
        assert_eq!(anthropic["content"][0]["text"], "Hi there!");
        assert_eq!(anthropic["stop_reason"], "end_turn");
        assert_eq!(anthropic["usage"]["output_tokens"], 0);
    }

    #[test]
    fn chat_id_uses_conversation_prefix() {
        assert_eq!(openai_chat_id("0123456789abcdef"), "chatcmpl-01234567");
    }

    #[test]
    fn event_name_is_independent_of_payload() {
        let frame = event_frame("ping", &serde_json::json!({ "index": 0 }));
        assert_eq!(frame, Bytes::from_static(b"event: ping\ndata: {\"index\":0}\n\n"));
    }
}

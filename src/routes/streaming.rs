use axum::body::Body;
use axum::http::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use axum::http::HeaderValue;
use axum::response::Response;
use bytes::Bytes;
use futures::{Stream, StreamExt};

use crate::{
    errors::ApiError,
    framing::{parse_fragment, StreamBuffer},
    translator::SseEmitter,
};

pub fn sse_response<S>(stream: S) -> Response
where
    S: Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static,
{
    let body = Body::from_stream(stream);
    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    response
}

// Frames keep upstream order; a client disconnect drops the generator.
pub fn relay_sse<S, UE, E>(upstream: S, mut emitter: E, buffer_cap: usize, log_responses: bool) -> Response
where
    S: Stream<Item = Result<Bytes, UE>> + Send + 'static,
    UE: std::fmt::Display + Send + 'static,
    E: SseEmitter + Send + 'static,
{
    let out_stream = async_stream::stream! {
        futures::pin_mut!(upstream);
        let mut buffer = StreamBuffer::new(buffer_cap);
        let mut fragments = 0usize;
        let mut failed = false;

        for frame in emitter.start() {
            yield Ok::<Bytes, std::io::Error>(frame);
        }

        while let Some(chunk) = upstream.next().await {
            match chunk {
                Ok(bytes) => {
                    for raw in buffer.feed(&bytes) {
                        if let Some(text) = parse_fragment(&raw) {
                            fragments += 1;
                            for frame in emitter.delta(&text) {
                                yield Ok(frame);
                            }
                        }
                    }
                }
                Err(err) => {
                    let err = ApiError::StreamTranslation(format!("upstream stream error: {err}"));
                    tracing::error!("Relay aborted after {} fragments: {}", fragments, err);
                    yield Ok(emitter.error(&err.to_string()));
                    failed = true;
                    break;
                }
            }
        }

        if !failed {
            let leftover = buffer.len();
            if let Some(text) = buffer.finish() {
                tracing::debug!("No content objects in upstream reply, relaying {} bytes as plain text", leftover);
                fragments += 1;
                for frame in emitter.delta(&text) {
                    yield Ok(frame);
                }
            }
            for frame in emitter.finish() {
                yield Ok(frame);
            }
            if log_responses {
                tracing::info!("Streaming response complete ({} fragments)", fragments);
            }
        }
    };

    sse_response(out_stream)
}

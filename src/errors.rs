use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    MissingCredentials(String),
    #[error("token refresh rejected ({status}): {body}")]
    AuthRefresh { status: u16, body: String },
    #[error("upstream request failed ({status}): {body}")]
    UpstreamRequest { status: u16, body: String },
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("stream translation failed: {0}")]
    StreamTranslation(String),
    #[error("{0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorMessage,
}

#[derive(Debug, Serialize)]
struct ErrorMessage {
    message: String,
    r#type: &'static str,
    code: &'static str,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::MissingCredentials(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::AuthRefresh { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::UpstreamRequest { .. } => StatusCode::BAD_GATEWAY,
            ApiError::UpstreamUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::StreamTranslation(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "invalid_request_error",
            ApiError::MissingCredentials(_) | ApiError::AuthRefresh { .. } => "authentication_error",
            ApiError::UpstreamRequest { .. } | ApiError::UpstreamUnavailable(_) => "amazon_q_error",
            ApiError::StreamTranslation(_) => "stream_error",
            ApiError::Internal(_) => "server_error",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "invalid_request",
            ApiError::MissingCredentials(_) => "missing_credentials",
            ApiError::AuthRefresh { .. } => "token_refresh_failed",
            ApiError::UpstreamRequest { .. } => "upstream_error",
            ApiError::UpstreamUnavailable(_) => "service_unavailable",
            ApiError::StreamTranslation(_) => "stream_translation_error",
            ApiError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            error: ErrorMessage {
                message: self.to_string(),
                r#type: self.error_type(),
                code: self.code(),
            },
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::ApiError;
    use axum::{http::StatusCode, response::IntoResponse};

    async fn body_json(err: ApiError) -> (StatusCode, serde_json::Value) {
        let resp = err.into_response();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        (status, serde_json::from_slice(&bytes).expect("json body"))
    }

    #[tokio::test]
    async fn validation_error_is_structured_400() {
        let (status, json) = body_json(ApiError::Validation("messages must not be empty".to_string())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["message"], "messages must not be empty");
        assert_eq!(json["error"]["type"], "invalid_request_error");
        assert_eq!(json["error"]["code"], "invalid_request");
    }

    #[tokio::test]
    async fn auth_refresh_embeds_upstream_status() {
        let (status, json) = body_json(ApiError::AuthRefresh {
            status: 400,
            body: "invalid_grant".to_string(),
        })
        .await;
        assert!(status.is_server_error());
        let message = json["error"]["message"].as_str().unwrap_or("");
        assert!(message.contains("400"));
        assert!(message.contains("invalid_grant"));
        assert_eq!(json["error"]["code"], "token_refresh_failed");
    }

    #[test]
    fn upstream_request_maps_to_bad_gateway() {
        let err = ApiError::UpstreamRequest { status: 500, body: String::new() };
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(err.error_type(), "amazon_q_error");
    }
}

use reqwest::StatusCode;
use serde::Serialize;

use crate::{
    config::{apply_headers, upstream_headers, AppConfig},
    errors::{ApiError, ApiResult},
    token::TokenManager,
    utils::truncate_for_log,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateAssistantPayload {
    pub conversation_state: ConversationState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_arn: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationState {
    pub chat_trigger_type: &'static str,
    pub conversation_id: String,
    pub current_message: CurrentMessage,
    pub history: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentMessage {
    pub user_input_message: UserInputMessage,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInputMessage {
    pub content: String,
    pub images: Vec<serde_json::Value>,
    pub model_id: String,
    pub origin: &'static str,
    pub user_input_message_context: UserInputMessageContext,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInputMessageContext {
    pub editor_state: EditorState,
    pub env_state: EnvState,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorState {
    pub use_relevant_documents: bool,
    pub workspace_folders: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvState {
    pub operating_system: &'static str,
}

impl GenerateAssistantPayload {
    /// One user turn with no file, workspace, or history context.
    pub fn new(text: &str, conversation_id: &str, model_id: &str, profile_arn: Option<String>) -> Self {
        Self {
            conversation_state: ConversationState {
                chat_trigger_type: "MANUAL",
                conversation_id: conversation_id.to_string(),
                current_message: CurrentMessage {
                    user_input_message: UserInputMessage {
                        content: text.to_string(),
                        images: Vec::new(),
                        model_id: model_id.to_string(),
                        origin: "IDE",
                        user_input_message_context: UserInputMessageContext {
                            editor_state: EditorState {
                                use_relevant_documents: false,
                                workspace_folders: Vec::new(),
                            },
                            env_state: EnvState {
                                operating_system: "linux",
                            },
                        },
                    },
                },
                history: Vec::new(),
            },
            profile_arn,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Attempt,
    RefreshAndRetry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Deliver,
    Next(Phase),
    Terminal,
}

fn is_auth_failure(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

/// Only an auth failure on the first attempt earns a refresh and retry.
pub fn transition(phase: Phase, status: StatusCode) -> Step {
    if status.is_success() {
        return Step::Deliver;
    }
    match phase {
        Phase::Attempt if is_auth_failure(status) => Step::Next(Phase::RefreshAndRetry),
        _ => Step::Terminal,
    }
}

pub struct AmazonQClient<'a> {
    client: &'a reqwest::Client,
    config: &'a AppConfig,
}

impl<'a> AmazonQClient<'a> {
    pub fn new(client: &'a reqwest::Client, config: &'a AppConfig) -> Self {
        Self { client, config }
    }

    /// Issues the assistant call and hands back the raw response, unread.
    pub async fn send_message(
        &self,
        tokens: &mut TokenManager,
        text: &str,
        conversation_id: &str,
        model_id: &str,
    ) -> ApiResult<reqwest::Response> {
        let payload = GenerateAssistantPayload::new(
            text,
            conversation_id,
            model_id,
            tokens.credentials().profile_arn.clone(),
        );
        let url = self.config.assistant_url();

        if self.config.logging.log_requests {
            let preview = serde_json::to_string(&payload).unwrap_or_default();
            tracing::info!(
                conversation_id,
                "Sending to Amazon Q {}: {}",
                url,
                truncate_for_log(&preview, self.config.logging.max_log_length)
            );
        }

        let mut phase = Phase::Attempt;
        loop {
            let token = match phase {
                Phase::Attempt => tokens.get_access_token().await?,
                Phase::RefreshAndRetry => tokens.refresh().await?,
            };

            let mut headers = reqwest::header::HeaderMap::new();
            apply_headers(&mut headers, upstream_headers(&token));

            let resp = self
                .client
                .post(&url)
                .headers(headers)
                .json(&payload)
                .send()
                .await
                .map_err(|e| ApiError::UpstreamUnavailable(format!("Amazon Q request failed: {e}")))?;

            let status = resp.status();
            if self.config.logging.log_responses {
                tracing::info!(?phase, "Amazon Q responded {}", status);
            }

            match transition(phase, status) {
                Step::Deliver => return Ok(resp),
                Step::Next(next) => {
                    tracing::warn!("Amazon Q rejected the access token ({}), refreshing and retrying once", status);
                    phase = next;
                }
                Step::Terminal => {
                    let body = resp.text().await.unwrap_or_default();
                    tracing::error!(
                        "Amazon Q request failed ({}): {}",
                        status,
                        truncate_for_log(&body, self.config.logging.max_log_length)
                    );
                    return Err(ApiError::UpstreamRequest {
                        status: status.as_u16(),
                        body,
                    });
                }
            }
        }
    }
}

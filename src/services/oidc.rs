use serde::Deserialize;

use crate::errors::{ApiError, ApiResult};

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    #[serde(rename = "accessToken", alias = "access_token")]
    pub access_token: String,
    #[serde(rename = "expiresIn", alias = "expires_in", default = "default_expires_in")]
    pub expires_in: u64,
    #[serde(rename = "refreshToken", alias = "refresh_token", default)]
    pub refresh_token: Option<String>,
}

fn default_expires_in() -> u64 {
    3600
}

pub struct RefreshGrant<'a> {
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub refresh_token: &'a str,
}

/// Exchanges a refresh token at the SSO OIDC token endpoint.
pub async fn refresh_access_token(
    client: &reqwest::Client,
    token_url: &str,
    grant: &RefreshGrant<'_>,
) -> ApiResult<TokenResponse> {
    let resp = client
        .post(token_url)
        .header("accept", "application/json")
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", grant.refresh_token),
            ("client_id", grant.client_id),
            ("client_secret", grant.client_secret),
        ])
        .send()
        .await
        .map_err(|e| ApiError::UpstreamUnavailable(format!("Failed to reach token endpoint: {e}")))?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ApiError::AuthRefresh {
            status: status.as_u16(),
            body,
        });
    }

    resp.json::<TokenResponse>()
        .await
        .map_err(|e| ApiError::Internal(format!("Invalid token response: {e}")))
}

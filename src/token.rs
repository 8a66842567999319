use std::{path::PathBuf, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

use crate::{
    cli_db,
    config::AppConfig,
    errors::{ApiError, ApiResult},
    services::oidc::{refresh_access_token, RefreshGrant},
    state::AppState,
    token_store::{CredentialStore, Credentials},
    utils::mask_token,
};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialsUpdate {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    pub access_token: Option<String>,
    pub expires_in: Option<u64>,
    pub profile_arn: Option<String>,
}

impl CredentialsUpdate {
    pub fn is_empty(&self) -> bool {
        self.client_id.is_none()
            && self.client_secret.is_none()
            && self.refresh_token.is_none()
            && self.access_token.is_none()
            && self.expires_in.is_none()
            && self.profile_arn.is_none()
    }

    fn changes_identity(&self) -> bool {
        self.client_id.is_some() || self.client_secret.is_some() || self.refresh_token.is_some()
    }
}

// One per request; every mutation is saved before the call returns.
#[derive(Debug)]
pub struct TokenManager {
    credentials: Credentials,
    store: Arc<dyn CredentialStore>,
    client: reqwest::Client,
    token_url: String,
    refresh_margin_seconds: u64,
    log_token_refresh: bool,
    cli_db: Option<PathBuf>,
}

impl TokenManager {
    pub async fn load(state: &AppState) -> Self {
        let credentials = match state.store.load().await {
            Ok(Some(credentials)) => credentials,
            Ok(None) => from_static_config(&state.config),
            Err(err) => {
                tracing::warn!("Credential store unreadable, using static configuration: {}", err);
                from_static_config(&state.config)
            }
        };

        Self {
            credentials,
            store: state.store.clone(),
            client: state.client.clone(),
            token_url: state.config.token_url(),
            refresh_margin_seconds: state.config.performance.token_refresh_margin_seconds,
            log_token_refresh: state.config.logging.log_token_refresh,
            cli_db: state.config.cli_db_path(),
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    // Expiry is not consulted here.
    pub async fn get_access_token(&mut self) -> ApiResult<String> {
        if let Some(token) = self.credentials.access_token.as_ref().filter(|t| !t.is_empty()) {
            return Ok(token.clone());
        }
        if self.log_token_refresh {
            tracing::info!("No cached access token, refreshing");
        }
        self.refresh().await
    }

    pub async fn refresh(&mut self) -> ApiResult<String> {
        if let Some(token) = self.take_cli_session().await? {
            return Ok(token);
        }
        if !self.credentials.has_refresh_grant() {
            return Err(ApiError::MissingCredentials(
                "refresh_token, client_id and client_secret must be set before a token can be refreshed".to_string(),
            ));
        }

        if self.log_token_refresh {
            tracing::info!(
                client_id = %mask_token(&self.credentials.client_id),
                "Refreshing access token at {}",
                self.token_url
            );
        }

        let grant = RefreshGrant {
            client_id: &self.credentials.client_id,
            client_secret: &self.credentials.client_secret,
            refresh_token: &self.credentials.refresh_token,
        };
        let response = match refresh_access_token(&self.client, &self.token_url, &grant).await {
            Ok(response) => response,
            Err(err) => {
                tracing::error!("Access token refresh failed: {}", err);
                return Err(err);
            }
        };

        self.credentials.access_token = Some(response.access_token.clone());
        self.credentials.expires_in = Some(response.expires_in);
        self.credentials.expires_at = expiry_after(response.expires_in, self.refresh_margin_seconds);
        if let Some(rotated) = response.refresh_token.filter(|t| !t.is_empty()) {
            self.credentials.refresh_token = rotated;
        }
        self.store.save(&self.credentials).await?;

        if self.log_token_refresh {
            tracing::info!(
                token = %mask_token(&response.access_token),
                "Access token refreshed, valid for {}s",
                response.expires_in
            );
        }

        Ok(response.access_token)
    }

    async fn take_cli_session(&mut self) -> ApiResult<Option<String>> {
        let Some(path) = self.cli_db.clone() else {
            return Ok(None);
        };
        let read_path = path.clone();
        let read = tokio::task::spawn_blocking(move || cli_db::read_token(&read_path))
            .await
            .map_err(|e| ApiError::Internal(format!("CLI database task failed: {e}")))?;

        let session = match read {
            Ok(Some(session)) => session,
            Ok(None) => {
                tracing::warn!("No session in Amazon Q CLI database {}, using refresh grant", path.display());
                return Ok(None);
            }
            Err(err) => {
                tracing::warn!("Amazon Q CLI database unusable, using refresh grant: {}", err);
                return Ok(None);
            }
        };
        let Some(access_token) = session.access_token.filter(|t| !t.is_empty()) else {
            return Ok(None);
        };

        self.credentials.access_token = Some(access_token.clone());
        self.credentials.expires_in = None;
        self.credentials.expires_at = None;
        if let Some(rotated) = session.refresh_token.filter(|t| !t.is_empty()) {
            self.credentials.refresh_token = rotated;
        }
        self.store.save(&self.credentials).await?;

        if self.log_token_refresh {
            tracing::info!(token = %mask_token(&access_token), "Took access token from Amazon Q CLI database");
        }
        Ok(Some(access_token))
    }

    pub async fn set_credentials(&mut self, update: CredentialsUpdate) -> ApiResult<()> {
        let clear_cached = update.changes_identity() && update.access_token.is_none();
        let creds = &mut self.credentials;

        if let Some(v) = update.client_id {
            creds.client_id = v;
        }
        if let Some(v) = update.client_secret {
            creds.client_secret = v;
        }
        if let Some(v) = update.refresh_token {
            creds.refresh_token = v;
        }
        if clear_cached {
            creds.access_token = None;
            creds.expires_in = None;
            creds.expires_at = None;
        }
        if let Some(v) = update.access_token {
            creds.access_token = Some(v);
        }
        if let Some(v) = update.expires_in {
            creds.expires_in = Some(v);
        }
        if let Some(v) = update.profile_arn {
            creds.profile_arn = Some(v);
        }

        self.store.save(&self.credentials).await?;
        tracing::info!("Credentials updated");
        Ok(())
    }
}

// `None` when the lifetime does not fit a timestamp.
fn expiry_after(expires_in: u64, margin_seconds: u64) -> Option<DateTime<Utc>> {
    let effective = i64::try_from(expires_in.saturating_sub(margin_seconds)).ok()?;
    Utc::now().checked_add_signed(Duration::try_seconds(effective)?)
}

fn from_static_config(config: &AppConfig) -> Credentials {
    let s = &config.credentials;
    Credentials {
        client_id: s.client_id.clone().unwrap_or_default(),
        client_secret: s.client_secret.clone().unwrap_or_default(),
        refresh_token: s.refresh_token.clone().unwrap_or_default(),
        access_token: s.access_token.clone(),
        profile_arn: s.profile_arn.clone(),
        ..Credentials::default()
    }
}

use std::path::{Path, PathBuf};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Deserialize;

use crate::errors::{ApiError, ApiResult};

pub const AMAZONQ_ENDPOINT: &str = "https://codewhisperer.us-east-1.amazonaws.com";
pub const SSO_OIDC_ENDPOINT: &str = "https://oidc.us-east-1.amazonaws.com";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4.5";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub endpoint: String,
    pub oidc_endpoint: String,
    pub default_model: String,
    pub credentials_path: Option<PathBuf>,
    pub credentials: StaticCredentials,
    pub cli_db: CliDbConfig,
    pub logging: LoggingConfig,
    pub performance: PerformanceConfig,
}

/// Fallback credential values used when the store holds no record.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StaticCredentials {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    pub access_token: Option<String>,
    pub profile_arn: Option<String>,
}

/// Amazon Q CLI database consulted before the refresh grant.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CliDbConfig {
    pub enabled: bool,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub log_requests: bool,
    pub log_responses: bool,
    pub log_token_refresh: bool,
    pub max_log_length: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    pub buffer_max_size: usize,
    pub token_refresh_margin_seconds: u64,
    pub request_timeout_seconds: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            endpoint: AMAZONQ_ENDPOINT.to_string(),
            oidc_endpoint: SSO_OIDC_ENDPOINT.to_string(),
            default_model: DEFAULT_MODEL.to_string(),
            credentials_path: None,
            credentials: StaticCredentials::default(),
            cli_db: CliDbConfig::default(),
            logging: LoggingConfig::default(),
            performance: PerformanceConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_requests: true,
            log_responses: true,
            log_token_refresh: true,
            max_log_length: 500,
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            buffer_max_size: 10240,
            token_refresh_margin_seconds: 300,
            request_timeout_seconds: 120,
        }
    }
}

impl AppConfig {
    /// Reads the optional TOML file, then applies `AMAZONQ_*` environment overrides.
    pub fn load(path: Option<&Path>) -> ApiResult<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .map_err(|e| ApiError::Internal(format!("Failed to read config {}: {e}", path.display())))?;
                Self::from_toml(&raw)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> ApiResult<Self> {
        toml::from_str(raw).map_err(|e| ApiError::Internal(format!("Invalid config: {e}")))
    }

    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("AMAZONQ_ENDPOINT") {
            self.endpoint = v;
        }
        if let Some(v) = lookup("AMAZONQ_OIDC_ENDPOINT") {
            self.oidc_endpoint = v;
        }
        if let Some(v) = lookup("AMAZONQ_CREDENTIALS_PATH") {
            self.credentials_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("AMAZONQ_CLI_DB_PATH").filter(|v| !v.trim().is_empty()) {
            self.cli_db.enabled = true;
            self.cli_db.path = Some(PathBuf::from(v));
        }
        let creds = &mut self.credentials;
        for (key, slot) in [
            ("AMAZONQ_CLIENT_ID", &mut creds.client_id),
            ("AMAZONQ_CLIENT_SECRET", &mut creds.client_secret),
            ("AMAZONQ_REFRESH_TOKEN", &mut creds.refresh_token),
            ("AMAZONQ_ACCESS_TOKEN", &mut creds.access_token),
            ("AMAZONQ_PROFILE_ARN", &mut creds.profile_arn),
        ] {
            if let Some(v) = lookup(key).filter(|v| !v.trim().is_empty()) {
                *slot = Some(v);
            }
        }
    }

    fn validate(&self) -> ApiResult<()> {
        for (name, value) in [("endpoint", &self.endpoint), ("oidc_endpoint", &self.oidc_endpoint)] {
            url::Url::parse(value).map_err(|e| ApiError::Internal(format!("Invalid {name} {value:?}: {e}")))?;
        }
        if self.performance.buffer_max_size == 0 {
            return Err(ApiError::Internal("performance.buffer_max_size must be positive".to_string()));
        }
        Ok(())
    }

    pub fn assistant_url(&self) -> String {
        format!("{}/generateAssistantResponse", self.endpoint.trim_end_matches('/'))
    }

    pub fn token_url(&self) -> String {
        format!("{}/token", self.oidc_endpoint.trim_end_matches('/'))
    }

    pub fn cli_db_path(&self) -> Option<PathBuf> {
        if !self.cli_db.enabled {
            return None;
        }
        crate::cli_db::locate(self.cli_db.path.as_deref())
    }
}

pub fn upstream_headers(token: &str) -> Vec<(String, String)> {
    vec![
        ("content-type".to_string(), "application/json".to_string()),
        ("authorization".to_string(), format!("Bearer {}", token)),
        ("x-amzn-codewhisperer-optout".to_string(), "false".to_string()),
    ]
}

pub fn apply_headers(map: &mut HeaderMap, headers: Vec<(String, String)>) {
    for (k, v) in headers {
        if let Ok(name) = HeaderName::from_bytes(k.as_bytes()) {
            if let Ok(value) = HeaderValue::from_str(&v) {
                map.insert(name, value);
            }
        }
    }
}

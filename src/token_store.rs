use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::errors::{ApiError, ApiResult};

/// The single credentials record the relay needs to call the upstream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub refresh_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_arn: Option<String>,
}

impl Credentials {
    pub fn has_refresh_grant(&self) -> bool {
        !self.refresh_token.is_empty() && !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

#[async_trait]
pub trait CredentialStore: Send + Sync + std::fmt::Debug {
    async fn load(&self) -> ApiResult<Option<Credentials>>;
    async fn save(&self, credentials: &Credentials) -> ApiResult<()>;
}

#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    record: RwLock<Option<Credentials>>,
}

impl MemoryCredentialStore {
    pub fn new(initial: Option<Credentials>) -> Self {
        Self {
            record: RwLock::new(initial),
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self) -> ApiResult<Option<Credentials>> {
        Ok(self.record.read().await.clone())
    }

    async fn save(&self, credentials: &Credentials) -> ApiResult<()> {
        *self.record.write().await = Some(credentials.clone());
        Ok(())
    }
}

/// JSON file on disk, written with owner-only permissions.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn load(&self) -> ApiResult<Option<Credentials>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(ApiError::Internal(format!("Failed to read credentials: {e}"))),
        };
        if content.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| ApiError::Internal(format!("Invalid credentials file: {e}")))
    }

    async fn save(&self, credentials: &Credentials) -> ApiResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ApiError::Internal(format!("Failed to create credentials dir: {e}")))?;
        }
        let content = serde_json::to_string_pretty(credentials)
            .map_err(|e| ApiError::Internal(format!("Failed to encode credentials: {e}")))?;

        // Each writer gets its own sibling file; rename makes the last one win whole.
        let tmp = self.path.with_file_name(format!(
            ".{}.{}.tmp",
            self.path.file_name().and_then(|n| n.to_str()).unwrap_or("credentials.json"),
            uuid::Uuid::new_v4().simple()
        ));
        if let Err(err) = write_private(&tmp, content.as_bytes()).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(ApiError::Internal(format!("Failed to write credentials: {err}")));
        }
        if let Err(err) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(ApiError::Internal(format!("Failed to replace credentials file: {err}")));
        }
        Ok(())
    }
}

async fn write_private(path: &Path, content: &[u8]) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);
    let mut file = options.open(path).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(err) = file.set_permissions(std::fs::Permissions::from_mode(0o600)).await {
            tracing::warn!("Could not restrict permissions on {}: {}", path.display(), err);
        }
    }

    file.write_all(content).await?;
    file.sync_all().await
}

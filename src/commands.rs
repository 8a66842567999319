use std::path::Path;

use crate::{
    cli_db::{self, CliAuth},
    errors::{ApiError, ApiResult},
    paths::get_paths,
    state::AppState,
    token::{CredentialsUpdate, TokenManager},
    utils::mask_token,
};

pub async fn run_debug(state: &AppState, credentials_path: Option<&Path>, json: bool) -> ApiResult<()> {
    let version = env!("CARGO_PKG_VERSION");
    let paths = get_paths()?;
    let tokens = TokenManager::load(state).await;
    let creds = tokens.credentials();

    let info = serde_json::json!({
        "version": version,
        "runtime": {
            "platform": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
        },
        "paths": {
            "APP_DIR": paths.app_dir.to_string_lossy(),
            "CREDENTIALS_PATH": credentials_path.map(|p| p.to_string_lossy().to_string()),
        },
        "cliDatabase": state.config.cli_db_path().map(|p| p.to_string_lossy().to_string()),
        "endpoint": state.config.endpoint,
        "oidcEndpoint": state.config.oidc_endpoint,
        "hasRefreshGrant": creds.has_refresh_grant(),
        "hasAccessToken": creds.access_token.as_deref().is_some_and(|t| !t.is_empty()),
        "tokenExpiry": creds.expires_at.map(|t| t.to_rfc3339()),
    });

    if json {
        println!("{}", serde_json::to_string_pretty(&info).unwrap_or_else(|_| "{}".to_string()));
    } else {
        println!(
            "amazonq-api-rs debug\n\nVersion: {}\nPlatform: {} {}\n\nPaths:\n- APP_DIR: {}\n- CREDENTIALS_PATH: {}\n\nEndpoint: {}\nOIDC endpoint: {}\nRefresh grant: {}\nAccess token: {}",
            version,
            std::env::consts::OS,
            std::env::consts::ARCH,
            paths.app_dir.display(),
            credentials_path.map(|p| p.display().to_string()).unwrap_or_else(|| "(memory)".to_string()),
            state.config.endpoint,
            state.config.oidc_endpoint,
            if creds.has_refresh_grant() { "Yes" } else { "No" },
            if info["hasAccessToken"].as_bool().unwrap_or(false) { "Yes" } else { "No" },
        );
    }

    Ok(())
}

pub async fn run_refresh_token(state: &AppState) -> ApiResult<()> {
    let mut tokens = TokenManager::load(state).await;
    let token = tokens.refresh().await?;
    let expiry = tokens
        .credentials()
        .expires_at
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "unknown".to_string());
    println!("Access token refreshed: {} (refresh before {})", mask_token(&token), expiry);
    Ok(())
}

pub async fn run_import_cli(state: &AppState, db: Option<&Path>, print: bool) -> ApiResult<()> {
    let path = cli_db::locate(db).ok_or_else(|| {
        ApiError::MissingCredentials("Amazon Q CLI database not found; pass --db".to_string())
    })?;
    let read_path = path.clone();
    let auth = tokio::task::spawn_blocking(move || cli_db::extract_auth(&read_path))
        .await
        .map_err(|e| ApiError::Internal(format!("CLI database task failed: {e}")))??;

    if print {
        println!("{}", serde_json::to_string(&auth).unwrap_or_else(|_| "{}".to_string()));
        return Ok(());
    }
    if auth.is_empty() {
        return Err(ApiError::MissingCredentials(format!(
            "No Amazon Q CLI login found in {}",
            path.display()
        )));
    }

    let has_profile = !auth.profile_arn.is_empty();
    let mut tokens = TokenManager::load(state).await;
    tokens.set_credentials(cli_auth_update(auth)).await?;
    println!(
        "Imported Amazon Q CLI credentials from {} (refresh grant: {}, profile ARN: {})",
        path.display(),
        if tokens.credentials().has_refresh_grant() { "yes" } else { "no" },
        if has_profile { "yes" } else { "no" },
    );
    Ok(())
}

fn cli_auth_update(auth: CliAuth) -> CredentialsUpdate {
    let present = |v: String| Some(v).filter(|v| !v.is_empty());
    CredentialsUpdate {
        client_id: present(auth.client_id),
        client_secret: present(auth.client_secret),
        refresh_token: present(auth.refresh_token),
        profile_arn: present(auth.profile_arn),
        ..CredentialsUpdate::default()
    }
}

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::errors::{ApiError, ApiResult};

const TOKEN_KEY: &str = "codewhisperer:odic:token";
const REGISTRATION_KEY: &str = "codewhisperer:odic:device-registration";
const PROFILE_KEY: &str = "api.codewhisperer.profile";

/// Session the Amazon Q CLI keeps current in its local database.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CliToken {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

/// Fields needed to run the relay from an existing CLI login.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CliAuth {
    pub profile_arn: String,
    pub refresh_token: String,
    pub client_id: String,
    pub client_secret: String,
}

impl CliAuth {
    pub fn is_empty(&self) -> bool {
        self.profile_arn.is_empty()
            && self.refresh_token.is_empty()
            && self.client_id.is_empty()
            && self.client_secret.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct Registration {
    #[serde(default)]
    client_id: String,
    #[serde(default)]
    client_secret: String,
}

#[derive(Debug, Deserialize)]
struct Profile {
    #[serde(default)]
    arn: String,
}

/// Candidate database locations for this platform, most likely first.
pub fn default_db_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(base) = directories::BaseDirs::new() {
        paths.push(base.data_local_dir().join("amazon-q").join("data.sqlite3"));
        if cfg!(target_os = "macos") {
            paths.push(base.home_dir().join(".aws").join("amazon-q").join("data.sqlite3"));
        }
    }
    paths
}

/// An explicit path is used as given; otherwise the first default that exists.
pub fn locate(explicit: Option<&Path>) -> Option<PathBuf> {
    match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => default_db_paths().into_iter().find(|p| p.exists()),
    }
}

fn open(path: &Path) -> ApiResult<Connection> {
    if !path.exists() {
        return Err(ApiError::MissingCredentials(format!(
            "Amazon Q CLI database not found at {}",
            path.display()
        )));
    }
    Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX)
        .map_err(|e| ApiError::Internal(format!("Failed to open {}: {e}", path.display())))
}

fn lookup<T: serde::de::DeserializeOwned>(conn: &Connection, table: &str, key: &str) -> ApiResult<Option<T>> {
    let sql = format!("SELECT value FROM {table} WHERE key = ?1");
    let raw: Option<String> = conn
        .query_row(&sql, [key], |row| row.get(0))
        .optional()
        .map_err(|e| ApiError::Internal(format!("Failed to read {table}.{key}: {e}")))?;
    match raw {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| ApiError::Internal(format!("Invalid JSON in {table}.{key}: {e}"))),
        None => Ok(None),
    }
}

pub fn read_token(path: &Path) -> ApiResult<Option<CliToken>> {
    let conn = open(path)?;
    lookup(&conn, "auth_kv", TOKEN_KEY)
}

/// Missing rows leave their fields empty; a missing `state` table is tolerated.
pub fn extract_auth(path: &Path) -> ApiResult<CliAuth> {
    let conn = open(path)?;
    let mut auth = CliAuth::default();

    match lookup::<Profile>(&conn, "state", PROFILE_KEY) {
        Ok(Some(profile)) => auth.profile_arn = profile.arn,
        Ok(None) => {}
        Err(err) => tracing::debug!("No CLI profile: {}", err),
    }
    if let Some(token) = lookup::<CliToken>(&conn, "auth_kv", TOKEN_KEY)? {
        auth.refresh_token = token.refresh_token.unwrap_or_default();
    }
    if let Some(reg) = lookup::<Registration>(&conn, "auth_kv", REGISTRATION_KEY)? {
        auth.client_id = reg.client_id;
        auth.client_secret = reg.client_secret;
    }

    Ok(auth)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::path::{Path, PathBuf};

    use rusqlite::{params, Connection};

    use super::{extract_auth, locate, read_token, CliAuth, CliToken};
    use crate::errors::ApiError;

    pub(crate) fn write_cli_db(dir: &Path, rows: &[(&str, &str, &str)]) -> PathBuf {
        let path = dir.join("data.sqlite3");
        let conn = Connection::open(&path).expect("open db");
        conn.execute_batch(
            "CREATE TABLE auth_kv (key TEXT PRIMARY KEY, value TEXT);
             CREATE TABLE state (key TEXT PRIMARY KEY, value TEXT);",
        )
        .expect("schema");
        for (table, key, value) in rows {
            conn.execute(&format!("INSERT INTO {table} (key, value) VALUES (?1, ?2)"), params![key, value])
                .expect("insert");
        }
        path
    }

    #[test]
    fn reads_current_cli_token() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_cli_db(
            dir.path(),
            &[(
                "auth_kv",
                "codewhisperer:odic:token",
                r#"{"access_token":"aoa-cli","refresh_token":"aor-rotated","expires_at":"2030-01-01T00:00:00Z"}"#,
            )],
        );
        assert_eq!(
            read_token(&path).expect("read"),
            Some(CliToken {
                access_token: Some("aoa-cli".to_string()),
                refresh_token: Some("aor-rotated".to_string()),
            })
        );
    }

    #[test]
    fn missing_token_row_is_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_cli_db(dir.path(), &[]);
        assert_eq!(read_token(&path).expect("read"), None);
    }

    #[test]
    fn missing_database_is_explicit_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = read_token(&dir.path().join("absent.sqlite3"));
        assert!(matches!(result, Err(ApiError::MissingCredentials(_))));
    }

    #[test]
    fn extracts_full_login() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_cli_db(
            dir.path(),
            &[
                ("state", "api.codewhisperer.profile", r#"{"arn":"arn:aws:codewhisperer:us-east-1:1:profile/P","profileName":"p"}"#),
                ("auth_kv", "codewhisperer:odic:token", r#"{"access_token":"a","refresh_token":"r"}"#),
                ("auth_kv", "codewhisperer:odic:device-registration", r#"{"client_id":"cid","client_secret":"sec","region":"us-east-1"}"#),
            ],
        );
        assert_eq!(
            extract_auth(&path).expect("extract"),
            CliAuth {
                profile_arn: "arn:aws:codewhisperer:us-east-1:1:profile/P".to_string(),
                refresh_token: "r".to_string(),
                client_id: "cid".to_string(),
                client_secret: "sec".to_string(),
            }
        );
    }

    #[test]
    fn partial_login_leaves_fields_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_cli_db(
            dir.path(),
            &[("auth_kv", "codewhisperer:odic:device-registration", r#"{"client_id":"cid","client_secret":"sec"}"#)],
        );
        let auth = extract_auth(&path).expect("extract");
        assert_eq!(auth.client_id, "cid");
        assert!(auth.refresh_token.is_empty() && auth.profile_arn.is_empty());
        assert!(!auth.is_empty());
    }

    #[test]
    fn explicit_path_is_used_verbatim() {
        let path = Path::new("/nonexistent/data.sqlite3");
        assert_eq!(locate(Some(path)), Some(path.to_path_buf()));
    }
}

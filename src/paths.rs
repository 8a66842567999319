use std::path::PathBuf;

use crate::errors::{ApiError, ApiResult};

pub struct AppPaths {
    pub app_dir: PathBuf,
    pub credentials_path: PathBuf,
}

pub fn get_paths() -> ApiResult<AppPaths> {
    let base_dirs = directories::BaseDirs::new()
        .ok_or_else(|| ApiError::Internal("Failed to resolve data directory".to_string()))?;
    let base = base_dirs.data_local_dir();

    let app_dir = base.join("amazonq-api");
    let credentials_path = app_dir.join("credentials.json");

    Ok(AppPaths {
        app_dir,
        credentials_path,
    })
}

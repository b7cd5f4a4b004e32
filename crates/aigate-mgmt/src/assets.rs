//! Management console asset lookup. The HTML lives on disk next to the
//! config file unless `MANAGEMENT_STATIC_PATH` points elsewhere.

use std::env;
use std::path::{Path, PathBuf};

pub const MANAGEMENT_FILE_NAME: &str = "management.html";
pub const STATIC_PATH_ENV: &str = "MANAGEMENT_STATIC_PATH";

/// Resolves the directory holding the management HTML.
pub fn static_dir(config_path: &Path) -> PathBuf {
    if let Ok(overridden) = env::var(STATIC_PATH_ENV) {
        let trimmed = overridden.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }
    config_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("static")
}

pub fn asset_path(config_path: &Path) -> PathBuf {
    static_dir(config_path).join(MANAGEMENT_FILE_NAME)
}

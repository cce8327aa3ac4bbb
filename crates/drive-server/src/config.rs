use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ServerError, ServerResult};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "DRIVE_SERVER_CONFIG";
pub const DEFAULT_CONFIG_FILENAME: &str = "drive-server.json";

const DEFAULT_BIND: &str = "0.0.0.0:8080";
const DEFAULT_DRIVE_ROOT: &str = "/drive";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 1024 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerConfig {
    /// Socket address to listen on.
    pub bind: String,
    /// Directory whose contents are cataloged and served.
    pub drive_root: PathBuf,
    /// Directory for temporary directory archives.
    pub scratch_dir: PathBuf,
    /// Index the drive before accepting requests.
    pub scan_on_start: bool,
    /// Request body cap for uploads.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            drive_root: PathBuf::from(DEFAULT_DRIVE_ROOT),
            scratch_dir: std::env::temp_dir(),
            scan_on_start: true,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

/// Resolves the config path from `DRIVE_SERVER_CONFIG`, falling back to
/// `drive-server.json` in the working directory.
pub fn config_path_from_env() -> PathBuf {
    std::env::var_os(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILENAME))
}

/// Loads the config at `path`, writing the defaults there first if the file
/// does not exist.
pub fn load_or_create_config(path: &Path) -> ServerResult<ServerConfig> {
    if !path.exists() {
        let config = ServerConfig::default();
        write_config(path, &config)?;
        return Ok(config);
    }

    let data = std::fs::read_to_string(path).map_err(|source| ServerError::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&data).map_err(|source| ServerError::ConfigParse {
        path: path.to_path_buf(),
        source,
    })
}

fn write_config(path: &Path, config: &ServerConfig) -> ServerResult<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| ServerError::ConfigWrite {
            path: path.to_path_buf(),
            source,
        })?;
    }
    let data = serde_json::to_string_pretty(config).map_err(|source| ServerError::ConfigParse {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, data).map_err(|source| ServerError::ConfigWrite {
        path: path.to_path_buf(),
        source,
    })
}

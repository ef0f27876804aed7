//! Configuration management for paycheck.
//!
//! The config file uses `svcloud_*` and `box_*` keys. JSON, TOML and YAML
//! are accepted based on the file extension. Anything not set falls back to
//! the conventional layout under `~/.config/paycheck`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::errors::ErrorClass;
use crate::portal::DEFAULT_TIMEOUT;
use crate::report::Reporter;

/// Application name used for config discovery.
pub const APP_NAME: &str = "paycheck";
/// Default config file name inside the config directory.
pub const CONFIG_FILENAME: &str = "config.json";
/// Default repository directory name inside the config directory.
pub const REPOSITORY_SUBDIR: &str = "repository";
/// Default public key file name inside the config directory.
pub const PUBLIC_KEY_FILENAME: &str = "paycheck.asc";

/// Expected permissions of the config file (it holds credentials).
pub const CONFIG_FILE_MODE: u32 = 0o600;
/// Expected permissions of the repository directory.
pub const REPOSITORY_MODE: u32 = 0o700;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no config file found (looked for {})", .0.display())]
    NotFound(PathBuf),
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },
    #[error("missing required setting `{0}`")]
    Missing(&'static str),
    #[error("invalid portal base URL {url:?}: {message}")]
    InvalidBaseUrl { url: String, message: String },
    #[error("repository directory {} does not exist", .0.display())]
    MissingRepository(PathBuf),
    #[error("could not determine the home directory")]
    NoHomeDir,
}

impl ConfigError {
    pub fn class(&self) -> ErrorClass {
        ErrorClass::FatalSetup
    }
}

/// Raw contents of the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub svcloud_username: String,
    #[serde(default)]
    pub svcloud_password: String,
    #[serde(default)]
    pub svcloud_base_url: String,
    #[serde(default)]
    pub svcloud_endpoint: String,
    #[serde(default)]
    pub box_token: String,
    #[serde(default)]
    pub box_target_id: String,
    /// Override for the Box upload API root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub box_upload_url: Option<String>,
    /// Download directory. Defaults to `<config dir>/repository`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    /// Recipient public key. Defaults to `<config dir>/paycheck.asc`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    /// Directory for temporary ciphertexts. Defaults to the system temp dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmp_dir: Option<String>,
    /// Custom user agent. Defaults to a desktop Firefox string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
    /// Cap on concurrent items per stage. Unset means no cap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,

    /// Path the config was loaded from.
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

/// Resolved settings used by the run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub username: String,
    pub password: String,
    pub base_url: String,
    pub endpoint: String,
    pub box_token: String,
    pub box_target_id: String,
    pub box_upload_url: Option<String>,
    pub config_path: Option<PathBuf>,
    pub repository: PathBuf,
    pub public_key: PathBuf,
    pub tmp_dir: PathBuf,
    pub user_agent: Option<String>,
    pub request_timeout: Duration,
    pub max_concurrency: Option<usize>,
}

/// Default config directory: `~/.config/paycheck`.
pub fn default_config_dir() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::NoHomeDir)?;
    Ok(home.join(".config").join(APP_NAME))
}

impl Config {
    /// Load configuration from an explicit path, from a file discovered by
    /// `prefer`, or from `~/.config/paycheck/config.json`, in that order.
    pub async fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_from_path(path).await;
        }

        if let Ok(pref_config) = prefer::load(APP_NAME).await {
            if let Some(path) = pref_config.source_path() {
                debug!("Discovered config file {:?}", path);
                return Self::load_from_path(path).await;
            }
        }

        let fallback = default_config_dir()?.join(CONFIG_FILENAME);
        if !fallback.is_file() {
            return Err(ConfigError::NotFound(fallback));
        }
        Self::load_from_path(&fallback).await
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let mut config = Self::parse(&contents, path)?;
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    fn parse(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let parse_err = |message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            message,
        };

        match ext {
            "toml" => toml::from_str(contents).map_err(|e| parse_err(e.to_string())),
            "yaml" | "yml" => serde_yaml::from_str(contents).map_err(|e| parse_err(e.to_string())),
            _ => serde_json::from_str(contents).map_err(|e| parse_err(e.to_string())),
        }
    }

    /// Get the base directory for resolving relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are resolved against `base_dir`
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Check required fields and fill in defaults.
    pub fn into_settings(self) -> Result<Settings, ConfigError> {
        require(&self.svcloud_username, "svcloud_username")?;
        require(&self.svcloud_password, "svcloud_password")?;
        require(&self.svcloud_base_url, "svcloud_base_url")?;

        url::Url::parse(&self.svcloud_base_url).map_err(|e| ConfigError::InvalidBaseUrl {
            url: self.svcloud_base_url.clone(),
            message: e.to_string(),
        })?;

        let base_dir = match self.base_dir() {
            Some(dir) => dir,
            None => default_config_dir()?,
        };

        let repository = match &self.repository {
            Some(p) => self.resolve_path(p, &base_dir),
            None => base_dir.join(REPOSITORY_SUBDIR),
        };
        let public_key = match &self.public_key {
            Some(p) => self.resolve_path(p, &base_dir),
            None => base_dir.join(PUBLIC_KEY_FILENAME),
        };
        let tmp_dir = match &self.tmp_dir {
            Some(p) => self.resolve_path(p, &base_dir),
            None => std::env::temp_dir(),
        };

        Ok(Settings {
            username: self.svcloud_username,
            password: self.svcloud_password,
            base_url: self.svcloud_base_url,
            endpoint: self.svcloud_endpoint,
            box_token: self.box_token,
            box_target_id: self.box_target_id,
            box_upload_url: self.box_upload_url,
            config_path: self.source_path,
            repository,
            public_key,
            tmp_dir,
            user_agent: self.user_agent,
            request_timeout: self
                .request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_TIMEOUT),
            max_concurrency: self.max_concurrency,
        })
    }
}

fn require(value: &str, key: &'static str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        Err(ConfigError::Missing(key))
    } else {
        Ok(())
    }
}

impl Settings {
    /// Settings needed by the upload stage, if configured.
    pub fn has_upload_target(&self) -> bool {
        !self.box_token.is_empty() && !self.box_target_id.is_empty()
    }

    /// Audit filesystem permissions of the config file and repository.
    ///
    /// Loose permissions only produce warnings; a missing repository is an
    /// error.
    pub fn audit(&self, reporter: &dyn Reporter) -> Result<(), ConfigError> {
        if let Some(ref path) = self.config_path {
            check_mode(path, CONFIG_FILE_MODE, reporter);
        }

        if !self.repository.is_dir() {
            return Err(ConfigError::MissingRepository(self.repository.clone()));
        }
        check_mode(&self.repository, REPOSITORY_MODE, reporter);
        Ok(())
    }
}

/// Warn when `path` does not carry exactly `expected` permission bits.
#[cfg(unix)]
fn check_mode(path: &Path, expected: u32, reporter: &dyn Reporter) {
    use std::os::unix::fs::PermissionsExt;

    match std::fs::metadata(path) {
        Ok(meta) => {
            let mode = meta.permissions().mode() & 0o777;
            if mode != expected {
                reporter.warning(&format!(
                    "{} permits set to {:o} instead of {:o}",
                    path.display(),
                    mode,
                    expected
                ));
            }
        }
        Err(e) => reporter.warning(&format!("cannot stat {}: {}", path.display(), e)),
    }
}

#[cfg(not(unix))]
fn check_mode(_path: &Path, _expected: u32, _reporter: &dyn Reporter) {}

//! Application configuration for EverythingPDF.
//!
//! User config lives at `~/.everythingpdf/everythingpdf.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{EverythingPdfError, Result};
use crate::types::DEFAULT_OUTPUT_NAME;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "everythingpdf.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".everythingpdf";

// ---------------------------------------------------------------------------
// Config structs (matching everythingpdf.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Remote publish (share link) settings.
    #[serde(default)]
    pub publish: PublishConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// File name used when saving a build without `--out`.
    #[serde(default = "default_output_file")]
    pub output_file: String,

    /// Path of the local state database (plan persistence).
    #[serde(default = "default_state_db")]
    pub state_db: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_file: default_output_file(),
            state_db: default_state_db(),
        }
    }
}

fn default_output_file() -> String {
    DEFAULT_OUTPUT_NAME.into()
}
fn default_state_db() -> String {
    "~/.everythingpdf/state.db".into()
}

/// `[publish]` section.
///
/// Sharing is disabled unless `endpoint` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Upload base URL; objects are `PUT` to `<endpoint>/<prefix>/<name>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Base of the public link handed back to the user (defaults to `endpoint`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_base_url: Option<String>,

    /// Object key prefix.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Name of the env var holding an optional bearer token (never store the token itself).
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Upload timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            public_base_url: None,
            prefix: default_prefix(),
            token_env: default_token_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_prefix() -> String {
    "public".into()
}
fn default_token_env() -> String {
    "EVERYTHINGPDF_PUBLISH_TOKEN".into()
}
fn default_timeout_secs() -> u64 {
    60
}

impl PublishConfig {
    /// Whether a publish endpoint is configured.
    pub fn is_configured(&self) -> bool {
        self.endpoint.as_deref().is_some_and(|e| !e.trim().is_empty())
    }

    /// Parse the upload endpoint, if configured.
    pub fn endpoint_url(&self) -> Result<Option<Url>> {
        if !self.is_configured() {
            return Ok(None);
        }
        let raw = self.endpoint.as_deref().unwrap_or_default();
        Url::parse(raw)
            .map(Some)
            .map_err(|e| EverythingPdfError::config(format!("invalid publish endpoint '{raw}': {e}")))
    }

    /// Parse the public base URL, falling back to the endpoint.
    pub fn public_url(&self) -> Result<Option<Url>> {
        match self.public_base_url.as_deref() {
            Some(raw) if !raw.trim().is_empty() => Url::parse(raw).map(Some).map_err(|e| {
                EverythingPdfError::config(format!("invalid public_base_url '{raw}': {e}"))
            }),
            _ => self.endpoint_url(),
        }
    }

    /// Read the bearer token from the configured env var, if set and non-empty.
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env).ok().filter(|t| !t.is_empty())
    }
}

impl DefaultsConfig {
    /// Resolve `state_db`, expanding a leading `~/` to the home directory.
    pub fn state_db_path(&self) -> Result<PathBuf> {
        expand_home(&self.state_db)
    }
}

/// Expand a leading `~/` using the user's home directory.
fn expand_home(raw: &str) -> Result<PathBuf> {
    match raw.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir().ok_or_else(|| {
                EverythingPdfError::config("could not determine home directory")
            })?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(raw)),
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.everythingpdf/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| EverythingPdfError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.everythingpdf/everythingpdf.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| EverythingPdfError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        EverythingPdfError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| EverythingPdfError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| EverythingPdfError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| EverythingPdfError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

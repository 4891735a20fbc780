//! Filter configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. the `--config` command-line argument
//! 2. `$MIMESTAMP_CONFIG` (environment variable)
//! 3. `~/.config/mimestamp/config.toml` (Linux/macOS)
//!    `%APPDATA%\mimestamp\config.toml` (Windows)
//! 4. Built-in defaults
//!
//! The configuration is built once at startup and is read-only afterwards.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StampError};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Sender/recipient eligibility rules.
    pub filter: FilterConfig,
    /// The image that gets embedded.
    pub image: ImageConfig,
    /// Diagnostic copies of processed messages.
    pub archive: ArchiveConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Compute everything but never overwrite the message file.
    pub dry_run: bool,
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Directory for `mimestamp.log`. No log file when unset.
    pub log_dir: Option<PathBuf>,
    /// Upper bound for reading the message file and the image resource.
    pub read_timeout_secs: u64,
}

/// Which header text an address list is matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressSource {
    /// Addresses extracted from the raw `To` and `Cc` headers.
    Recipients,
    /// Addresses extracted from the decoded `From` header.
    From,
}

/// Sender/recipient eligibility rules.
///
/// All list entries are plain substrings, matched case-sensitively against
/// the extracted addresses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Messages whose recipients all contain this string are internal and left alone.
    pub target_domain: String,
    /// Deny list, takes precedence over the allow list.
    pub sender_blacklist: Vec<String>,
    /// Allow list. Empty means everyone not denied.
    pub sender_whitelist: Vec<String>,
    /// Recipients that must never receive a modified message.
    pub receiver_blacklist: Vec<String>,
    /// Header driving `sender_blacklist` and `sender_whitelist`.
    pub sender_source: AddressSource,
    /// Header driving `receiver_blacklist`.
    pub receiver_source: AddressSource,
}

/// The embedded image.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Directory holding the image file.
    pub directory: PathBuf,
    /// Versioned file name, e.g. `"02banner.jpg"`. Changing it refreshes
    /// previously stamped messages.
    pub filename: String,
    /// Version-independent name used in the `Content-ID`.
    pub base_filename: String,
    /// Domain part of the `Content-ID`.
    pub cid_domain: String,
}

/// Diagnostic copies of processed messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Save `.input.eml` / `.output.eml` copies of every processed message.
    pub save_processed: bool,
    /// Where copies go. Messages that fail are saved here as `.error.eml`.
    pub directory: Option<PathBuf>,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            log_level: "warn".to_string(),
            log_dir: None,
            read_timeout_secs: 10,
        }
    }
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            target_domain: "@example.com".to_string(),
            sender_blacklist: Vec::new(),
            sender_whitelist: Vec::new(),
            receiver_blacklist: Vec::new(),
            sender_source: AddressSource::Recipients,
            receiver_source: AddressSource::Recipients,
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("/opt/mimestamp"),
            filename: "00banner.jpg".to_string(),
            base_filename: "banner.jpg".to_string(),
            cid_domain: "example.com".to_string(),
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            save_processed: false,
            directory: Some(PathBuf::from("/tmp")),
        }
    }
}

impl GeneralConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs.max(1))
    }
}

impl ImageConfig {
    /// Full path of the image resource.
    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.filename)
    }
}

impl Config {
    /// Reject values the filter cannot work with.
    pub fn validate(&self) -> Result<()> {
        for (key, name) in [
            ("image.filename", &self.image.filename),
            ("image.base_filename", &self.image.base_filename),
        ] {
            if name.is_empty() {
                return Err(StampError::Config(format!("{key} must not be empty")));
            }
            if name.contains('/') || name.contains('\\') {
                return Err(StampError::Config(format!(
                    "{key} must be a bare file name, got '{name}'"
                )));
            }
        }
        if self.image.cid_domain.is_empty() {
            return Err(StampError::Config("image.cid_domain must not be empty".into()));
        }
        if self.filter.target_domain.is_empty() {
            return Err(StampError::Config(
                "filter.target_domain must not be empty (every recipient would count as internal)"
                    .into(),
            ));
        }
        Ok(())
    }
}

// ── Load ────────────────────────────────────────────────────────

/// Load configuration.
///
/// An explicitly given file must exist and parse. Otherwise the standard
/// locations are searched and the default configuration is returned if no
/// file is found or on parse error.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    let config = match explicit {
        Some(path) => read_config_file(path)?,
        None => load_from_standard_location(),
    };
    config.validate()?;
    Ok(config)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let contents = std::fs::read_to_string(path).map_err(|e| StampError::io(path, e))?;
    let cfg = toml::from_str::<Config>(&contents)
        .map_err(|e| StampError::Config(format!("{}: {e}", path.display())))?;
    tracing::info!(path = %path.display(), "Loaded config");
    Ok(cfg)
}

fn load_from_standard_location() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match read_config_file(&path) {
                Ok(cfg) => return cfg,
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to load config, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var("MIMESTAMP_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    dirs::config_dir().map(|d| d.join("mimestamp").join("config.toml"))
}

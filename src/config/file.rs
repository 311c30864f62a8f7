//! TOML configuration file loading
//!
//! Supports `~/.config/webm-relay/config.toml` as a persistent config source.
//! All fields are optional. The file is a partial overlay on top of defaults.

use std::path::PathBuf;

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct RelayConfigFile {
    /// Telegram transport configuration
    #[serde(default)]
    pub telegram: TelegramFileConfig,

    /// Storage locations
    #[serde(default)]
    pub storage: StorageFileConfig,

    /// Transcoder configuration
    #[serde(default)]
    pub transcoder: TranscoderFileConfig,

    /// Remote resource probing
    #[serde(default)]
    pub probe: ProbeFileConfig,

    /// Verbose transport logging
    pub debug: Option<bool>,
}

/// Telegram configuration
#[derive(Debug, Default, Deserialize)]
pub struct TelegramFileConfig {
    /// Bot token
    pub token: Option<String>,

    /// The only chat whose messages are accepted
    pub allowed_chat_id: Option<i64>,

    /// Delay between `getUpdates` calls
    pub poll_interval_ms: Option<u64>,
}

/// Storage locations
#[derive(Debug, Default, Deserialize)]
pub struct StorageFileConfig {
    /// Directory holding the conversion cache database
    pub data_dir: Option<String>,

    /// Directory for per-request scratch files
    pub scratch_dir: Option<String>,
}

/// Transcoder configuration
#[derive(Debug, Default, Deserialize)]
pub struct TranscoderFileConfig {
    /// Transcoder executable (name on PATH or absolute path)
    pub program: Option<String>,

    /// Constant rate factor passed to the transcoder
    pub crf: Option<u8>,
}

/// Remote resource probing
#[derive(Debug, Default, Deserialize)]
pub struct ProbeFileConfig {
    /// Timeout for the metadata probe
    pub timeout_secs: Option<u64>,
}

/// Load the TOML config file from the standard path
///
/// Returns `RelayConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> RelayConfigFile {
    let Some(path) = config_file_path() else {
        return RelayConfigFile::default();
    };

    if !path.exists() {
        return RelayConfigFile::default();
    }

    match std::fs::read_to_string(&path) {
        Ok(content) => match parse_config(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                RelayConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            RelayConfigFile::default()
        }
    }
}

/// Parse config file contents
///
/// # Errors
///
/// Returns error if the contents are not valid TOML for this schema
pub fn parse_config(content: &str) -> crate::Result<RelayConfigFile> {
    Ok(toml::from_str(content)?)
}

/// Return the config file path
///
/// `WEBM_RELAY_CONFIG` wins; otherwise `~/.config/webm-relay/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("WEBM_RELAY_CONFIG") {
        return Some(PathBuf::from(path));
    }

    directories::BaseDirs::new().map(|d| d.config_dir().join("webm-relay").join("config.toml"))
}

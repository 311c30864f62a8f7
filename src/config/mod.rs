//! Configuration management for the relay

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::{Error, Result};

use file::RelayConfigFile;

/// Default transcoder executable
pub const DEFAULT_TRANSCODER: &str = "ffmpeg";

/// Default constant rate factor for the transcoder
pub const DEFAULT_CRF: u8 = 26;

/// Default timeout for the metadata probe
const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 30;

/// Default delay between `getUpdates` calls
const DEFAULT_POLL_INTERVAL_MS: u64 = 500;

/// Scratch folder name under the system temp dir
const SCRATCH_SUBDIR: &str = "webm-relay";

/// Cache database file name inside the data directory
pub const DB_FILE_NAME: &str = "webms.db";

/// Relay configuration
#[derive(Debug)]
pub struct Config {
    /// Telegram bot token
    pub telegram_token: SecretString,

    /// The only chat whose messages are accepted
    pub allowed_chat_id: i64,

    /// Verbose transport logging (`DEBUG=true`)
    pub debug: bool,

    /// Directory holding the conversion cache database
    pub data_dir: PathBuf,

    /// Directory for per-request scratch files
    pub scratch_dir: PathBuf,

    /// Transcoder settings
    pub transcoder: TranscoderConfig,

    /// Timeout for the metadata probe
    pub probe_timeout: Duration,

    /// Delay between `getUpdates` calls
    pub poll_interval: Duration,
}

/// External transcoder settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscoderConfig {
    /// Executable name or path
    pub program: String,

    /// Constant rate factor (quality)
    pub crf: u8,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_TRANSCODER.to_string(),
            crf: DEFAULT_CRF,
        }
    }
}

/// Default scratch directory: a relay-owned folder under the system temp dir
fn default_scratch_dir() -> PathBuf {
    std::env::temp_dir().join(SCRATCH_SUBDIR)
}

/// `DEBUG` env (only `"true"` enables) wins over the file's `debug`
fn debug_flag<F>(fc: &RelayConfigFile, env: &F) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    env("DEBUG").map_or(fc.debug.unwrap_or(false), |v| v == "true")
}

/// Default data directory: `~/.local/share/webm-relay` on Linux
fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "webm-relay").map_or_else(
        || PathBuf::from("data"),
        |d| d.data_dir().to_path_buf(),
    )
}

impl Config {
    /// Load configuration from the environment and the optional TOML file
    ///
    /// # Errors
    ///
    /// Returns error if the bot token or allowed chat id is missing or invalid
    pub fn load() -> Result<Self> {
        let fc = file::load_config_file();
        Self::from_sources(&fc, |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed file and an environment lookup
    ///
    /// Precedence is env > file > default.
    ///
    /// # Errors
    ///
    /// Returns error if the bot token or allowed chat id is missing or invalid
    pub fn from_sources<F>(fc: &RelayConfigFile, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = env("TELEGRAM_BOT_TOKEN")
            .or_else(|| env("TOKEN"))
            .or_else(|| fc.telegram.token.clone())
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                Error::Config("TELEGRAM_BOT_TOKEN (or TOKEN) is not set".to_string())
            })?;

        let allowed_chat_id = match env("ALLOWED_CHAT_ID") {
            Some(raw) => raw.trim().parse::<i64>().map_err(|e| {
                Error::Config(format!("ALLOWED_CHAT_ID is not a chat id ({raw:?}): {e}"))
            })?,
            None => fc
                .telegram
                .allowed_chat_id
                .ok_or_else(|| Error::Config("ALLOWED_CHAT_ID is not set".to_string()))?,
        };

        let debug = debug_flag(fc, &env);

        let data_dir = env("WEBM_RELAY_DATA_DIR")
            .or_else(|| fc.storage.data_dir.clone())
            .map_or_else(default_data_dir, PathBuf::from);

        let scratch_dir = env("WEBM_RELAY_SCRATCH_DIR")
            .or_else(|| fc.storage.scratch_dir.clone())
            .map_or_else(default_scratch_dir, PathBuf::from);

        let transcoder = TranscoderConfig {
            program: env("WEBM_RELAY_FFMPEG")
                .or_else(|| fc.transcoder.program.clone())
                .unwrap_or_else(|| DEFAULT_TRANSCODER.to_string()),
            crf: env("WEBM_RELAY_CRF")
                .and_then(|v| v.parse().ok())
                .or(fc.transcoder.crf)
                .unwrap_or(DEFAULT_CRF),
        };

        let probe_timeout = Duration::from_secs(
            env("WEBM_RELAY_PROBE_TIMEOUT")
                .and_then(|v| v.parse().ok())
                .or(fc.probe.timeout_secs)
                .unwrap_or(DEFAULT_PROBE_TIMEOUT_SECS),
        );

        let poll_interval = Duration::from_millis(
            env("WEBM_RELAY_POLL_INTERVAL_MS")
                .and_then(|v| v.parse().ok())
                .or(fc.telegram.poll_interval_ms)
                .unwrap_or(DEFAULT_POLL_INTERVAL_MS),
        );

        Ok(Self {
            telegram_token: SecretString::from(token),
            allowed_chat_id,
            debug,
            data_dir,
            scratch_dir,
            transcoder,
            probe_timeout,
            poll_interval,
        })
    }

    /// Path of the conversion cache database
    #[must_use]
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(DB_FILE_NAME)
    }
}

/// Cache database path for offline commands
///
/// Resolves the data directory like [`Config::load`] without requiring the
/// bot token or chat id.
#[must_use]
pub fn resolve_db_path() -> PathBuf {
    let fc = file::load_config_file();
    std::env::var("WEBM_RELAY_DATA_DIR")
        .ok()
        .or(fc.storage.data_dir)
        .map_or_else(default_data_dir, PathBuf::from)
        .join(DB_FILE_NAME)
}

/// Debug flag for choosing the log level before full config is loaded
///
/// Same precedence as [`Config::load`].
#[must_use]
pub fn resolve_debug() -> bool {
    debug_flag(&file::load_config_file(), &|key: &str| std::env::var(key).ok())
}

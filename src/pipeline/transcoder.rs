//! External transcoder invocation

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use super::Failure;
use crate::config::TranscoderConfig;

/// Longest stderr excerpt carried in a failure
const STDERR_TAIL_CHARS: usize = 400;

/// Converts a WebM file into the delivery format
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Convert `input` into `output`, overwriting `output`
    async fn transcode(&self, input: &Path, output: &Path) -> Result<(), Failure>;
}

/// `ffmpeg` run as a child process
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    program: String,
    crf: u8,
}

impl FfmpegTranscoder {
    /// Create from config
    #[must_use]
    pub fn new(config: &TranscoderConfig) -> Self {
        Self {
            program: config.program.clone(),
            crf: config.crf,
        }
    }

    /// Whether the program can be found (on `PATH` or as a path)
    #[must_use]
    pub fn is_available(&self) -> bool {
        which::which(&self.program).is_ok()
    }

    /// Program that will be run
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Command-line arguments for one conversion
    #[must_use]
    pub fn args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        vec![
            "-y".into(),
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-i".into(),
            input.as_os_str().to_owned(),
            "-crf".into(),
            self.crf.to_string().into(),
            output.as_os_str().to_owned(),
        ]
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, input: &Path, output: &Path) -> Result<(), Failure> {
        let result = Command::new(&self.program)
            .args(self.args(input, output))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| Failure::ConversionFailed(format!("failed to run {}: {e}", self.program)))?;

        let stderr = String::from_utf8_lossy(&result.stderr);
        if !stderr.trim().is_empty() {
            tracing::debug!(program = %self.program, stderr = %stderr.trim(), "transcoder stderr");
        }

        if !result.status.success() {
            let code = result.status.code().unwrap_or(-1);
            return Err(Failure::ConversionFailed(format!(
                "{} exited with code {code}: {}",
                self.program,
                tail(stderr.trim(), STDERR_TAIL_CHARS)
            )));
        }

        Ok(())
    }
}

/// Last `max` characters of `text`
fn tail(text: &str, max: usize) -> &str {
    let count = text.chars().count();
    if count <= max {
        return text;
    }
    let skip = text
        .char_indices()
        .nth(count - max)
        .map_or(0, |(idx, _)| idx);
    &text[skip..]
}

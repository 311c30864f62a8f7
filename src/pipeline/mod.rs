//! Content-addressed conversion pipeline
//!
//! ```text
//!  Telegram poller ──► Intake ──(queue, depth 1)──► Processor
//!                                                      │
//!        Validating → Downloading → Hashing → CacheLookup
//!                                                │
//!                      hit ◄─────────────────────┴─────────► miss
//!                       │                                     │
//!                 CachedDeliver                 Converting → FreshDeliver → CacheStore
//! ```
//!
//! Exactly one request is inside the processor at a time. Scratch files are
//! unique per request and removed on every exit path.

pub mod delivery;
pub mod digest;
pub mod intake;
pub mod processor;
pub mod scratch;
pub mod source;
pub mod transcoder;

use std::fmt;

use thiserror::Error;

use crate::channels::MediaRef;

pub use delivery::Delivery;
pub use digest::{ContentDigest, digest_file};
pub use intake::{Intake, Rejection, handoff, is_media_url, run_intake};
pub use processor::Processor;
pub use scratch::ScratchSpace;
pub use source::{HttpSource, MediaSource, ResourceInfo, check_probe};
pub use transcoder::{FfmpegTranscoder, Transcoder};

/// Largest source the relay will fetch (50 MiB)
pub const MAX_SOURCE_BYTES: u64 = 50 * 1024 * 1024;

/// MIME type a source must declare
pub const EXPECTED_MIME: &str = "video/webm";

/// Extension a URL path must end with
pub const EXPECTED_EXTENSION: &str = ".webm";

/// Extension of converted output
pub const OUTPUT_EXTENSION: &str = ".mp4";

/// A queued conversion request
///
/// Built by intake from an accepted message and owned by the processor once
/// handed off.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Chat the link was posted in
    pub chat_id: i64,
    /// Message carrying the link (replies thread onto it)
    pub message_id: i64,
    /// The link itself
    pub url: String,
}

/// Request-scoped failure
///
/// The `Display` text is what the requester sees.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Failure {
    /// The metadata probe could not complete
    #[error("failed to receive file headers from url")]
    Unreachable(String),

    /// The remote did not answer with a success status
    #[error("status code is {0}")]
    BadStatus(u16),

    /// The declared content type is not WebM
    #[error("content type {0:?} is not suitable, expected video/webm")]
    WrongType(String),

    /// The declared or streamed size exceeds the ceiling
    #[error("file is {0} bytes, size should be less than 50 MiB")]
    TooLarge(u64),

    /// The body could not be fetched
    #[error("download file error")]
    DownloadFailed(String),

    /// The downloaded file could not be read back for hashing
    #[error("failed to read downloaded file")]
    HashFailed(String),

    /// The transcoder failed to start or exited non-zero
    #[error("conversion failed")]
    ConversionFailed(String),

    /// The transport refused the delivery
    #[error("failed to send video")]
    SendFailed(String),
}

impl Failure {
    /// Internal detail for logs (never sent to the chat)
    #[must_use]
    pub fn detail(&self) -> String {
        match self {
            Self::Unreachable(d)
            | Self::DownloadFailed(d)
            | Self::HashFailed(d)
            | Self::ConversionFailed(d)
            | Self::SendFailed(d) => d.clone(),
            Self::BadStatus(_) | Self::WrongType(_) | Self::TooLarge(_) => self.to_string(),
        }
    }
}

/// Processing stage of the current request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Waiting for the next request
    Idle,
    /// Probing the remote resource
    Validating,
    /// Fetching the body into scratch
    Downloading,
    /// Computing the content digest
    Hashing,
    /// Consulting the conversion cache
    CacheLookup,
    /// Resending a cached reference
    CachedDeliver,
    /// Running the transcoder
    Converting,
    /// Uploading the fresh conversion
    FreshDeliver,
    /// Recording the new reference
    CacheStore,
    /// Reporting a failure to the requester
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::Downloading => "downloading",
            Self::Hashing => "hashing",
            Self::CacheLookup => "cache_lookup",
            Self::CachedDeliver => "cached_deliver",
            Self::Converting => "converting",
            Self::FreshDeliver => "fresh_deliver",
            Self::CacheStore => "cache_store",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Terminal result of one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Content was already converted; the cached reference was resent
    Cached {
        /// Digest of the downloaded content
        digest: ContentDigest,
        /// Reference that was resent
        reference: MediaRef,
    },
    /// Content was converted and uploaded
    Converted {
        /// Digest of the downloaded content
        digest: ContentDigest,
        /// Reference assigned by the transport
        reference: MediaRef,
        /// Whether the reference made it into the cache
        cached: bool,
    },
    /// Processing stopped at `stage`
    Failed {
        /// Stage that failed
        stage: Stage,
        /// What went wrong
        failure: Failure,
    },
}

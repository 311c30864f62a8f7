//! Messaging channel adapters
//!
//! The relay core only talks to a chat transport through the `Channel` trait:
//! plain text replies, media by reference, and media by upload.

pub mod telegram;

use std::fmt;
use std::path::Path;

use async_trait::async_trait;

pub use telegram::{TelegramChannel, UpdateDedup};

use crate::Result;

/// A message received from a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    /// Chat the message was posted in
    pub chat_id: i64,

    /// Message identifier within the chat
    pub message_id: i64,

    /// Message text, if any
    pub text: Option<String>,
}

impl IncomingMessage {
    /// Create a text message
    #[must_use]
    pub fn text(chat_id: i64, message_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            message_id,
            text: Some(text.into()),
        }
    }
}

/// How the transport filed an uploaded clip
///
/// A reference can only be replayed as the kind it was filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    /// Regular video
    Video,
    /// Silent looping clip
    Animation,
    /// Generic file
    Document,
}

impl MediaKind {
    /// Stable name, used as the stored value
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Animation => "animation",
            Self::Document => "document",
        }
    }

    /// Parse a stored name
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "video" => Some(Self::Video),
            "animation" => Some(Self::Animation),
            "document" => Some(Self::Document),
            _ => None,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Replayable reference to media the transport already holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaRef {
    /// Kind the media was filed under
    pub kind: MediaKind,
    /// Transport-assigned identifier
    pub file_id: String,
}

impl MediaRef {
    /// Create a reference
    #[must_use]
    pub fn new(kind: MediaKind, file_id: impl Into<String>) -> Self {
        Self {
            kind,
            file_id: file_id.into(),
        }
    }
}

impl fmt::Display for MediaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.file_id)
    }
}

/// Trait for messaging channel adapters
#[async_trait]
pub trait Channel: Send + Sync {
    /// Get the channel name
    fn name(&self) -> &'static str;

    /// Connect to the channel
    async fn connect(&mut self) -> Result<()>;

    /// Send a plain text message, optionally as a reply
    async fn send_text(&self, chat_id: i64, reply_to: Option<i64>, text: &str) -> Result<()>;

    /// Resend previously uploaded media, using the method matching its kind
    async fn send_media_by_reference(
        &self,
        chat_id: i64,
        reply_to: Option<i64>,
        media: &MediaRef,
    ) -> Result<()>;

    /// Upload a local video file as new media
    ///
    /// Returns the reference assigned by the transport, which can be
    /// replayed with [`Channel::send_media_by_reference`].
    async fn upload_video(
        &self,
        chat_id: i64,
        reply_to: Option<i64>,
        path: &Path,
    ) -> Result<MediaRef>;
}

//! Telegram channel adapter
//!
//! Uses `getUpdates` long polling for receiving messages and the Bot API for sending

mod api;
pub mod dedup;
pub mod polling;
pub mod retry;
pub mod types;

use std::path::Path;

use async_trait::async_trait;
use reqwest::Client;
use tokio::sync::mpsc;

use super::{Channel, IncomingMessage, MediaRef};
use crate::Result;

pub use dedup::UpdateDedup;
pub use types::BotUser;

/// Capacity of the buffer between the poller and the intake loop
const INCOMING_BUFFER: usize = 100;

/// Telegram channel adapter
#[derive(Clone)]
pub struct TelegramChannel {
    token: String,
    client: Client,
    message_tx: Option<mpsc::Sender<IncomingMessage>>,
    connected: bool,
    /// Log raw Bot API responses
    debug: bool,
}

impl TelegramChannel {
    /// Create a new Telegram channel adapter
    #[must_use]
    pub fn new(token: String) -> Self {
        Self {
            token,
            client: Client::new(),
            message_tx: None,
            connected: false,
            debug: false,
        }
    }

    /// Create with a message receiver for polling mode
    ///
    /// Returns the channel and a receiver for incoming messages
    #[must_use]
    pub fn with_receiver(token: String) -> (Self, mpsc::Receiver<IncomingMessage>) {
        let (tx, rx) = mpsc::channel(INCOMING_BUFFER);
        let channel = Self {
            message_tx: Some(tx),
            ..Self::new(token)
        };
        (channel, rx)
    }

    /// Enable logging of raw Bot API traffic
    #[must_use]
    pub const fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Drop the sending half of the incoming message channel
    ///
    /// The polling task holds its own clone, so the receiver closes once
    /// polling stops.
    pub fn detach_receiver(&mut self) {
        self.message_tx = None;
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn connect(&mut self) -> Result<()> {
        let me = self.get_me().await?;
        self.connected = true;
        tracing::info!(
            bot_id = me.id,
            username = me.username.as_deref().unwrap_or("<unknown>"),
            "Telegram channel connected"
        );
        Ok(())
    }

    async fn send_text(&self, chat_id: i64, reply_to: Option<i64>, text: &str) -> Result<()> {
        self.send_message(chat_id, text, reply_to).await
    }

    async fn send_media_by_reference(
        &self,
        chat_id: i64,
        reply_to: Option<i64>,
        media: &MediaRef,
    ) -> Result<()> {
        self.send_media_by_file_id(chat_id, media, reply_to).await
    }

    async fn upload_video(
        &self,
        chat_id: i64,
        reply_to: Option<i64>,
        path: &Path,
    ) -> Result<MediaRef> {
        self.send_video_upload(chat_id, path, reply_to).await
    }
}

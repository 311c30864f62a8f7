//! Raw Telegram Bot API calls

use std::path::Path;

use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;

use super::types::{
    API_BASE, BotUser, SendMessageRequest, SentMessage, TelegramResponse, UPLOAD_FILE_NAME,
    UPLOAD_MIME, resend_method, resend_request,
};
use crate::channels::MediaRef;
use crate::{Error, Result};

impl super::TelegramChannel {
    /// Send a plain text message to a chat
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails
    pub async fn send_message(&self, chat_id: i64, text: &str, reply_to: Option<i64>) -> Result<()> {
        let url = format!("{API_BASE}{}/sendMessage", self.token);

        let request = SendMessageRequest {
            chat_id,
            text: text.to_string(),
            reply_to_message_id: reply_to,
            disable_web_page_preview: Some(true),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Channel(format!("Telegram sendMessage error: {e}")))?;

        let _: SentMessage = self.read_result("sendMessage", response).await?;

        tracing::debug!(chat_id, "Telegram message sent");
        Ok(())
    }

    /// Resend media by its `file_id` with the method matching its kind
    ///
    /// # Errors
    ///
    /// Returns error if the API request fails
    pub async fn send_media_by_file_id(
        &self,
        chat_id: i64,
        media: &MediaRef,
        reply_to: Option<i64>,
    ) -> Result<()> {
        let method = resend_method(media.kind);
        let url = format!("{API_BASE}{}/{method}", self.token);

        let response = self
            .client
            .post(&url)
            .json(&resend_request(chat_id, media, reply_to))
            .send()
            .await
            .map_err(|e| Error::Channel(format!("Telegram {method} error: {e}")))?;

        let _: SentMessage = self.read_result(method, response).await?;

        tracing::debug!(chat_id, kind = %media.kind, "Telegram media resent by file_id");
        Ok(())
    }

    /// Upload a local video file and return the reference Telegram assigned
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read, the API request fails, or the
    /// response carries no media
    pub async fn send_video_upload(
        &self,
        chat_id: i64,
        path: &Path,
        reply_to: Option<i64>,
    ) -> Result<MediaRef> {
        let url = format!("{API_BASE}{}/sendVideo", self.token);

        let data = tokio::fs::read(path).await?;
        let size = data.len();

        let part = Part::bytes(data)
            .file_name(UPLOAD_FILE_NAME)
            .mime_str(UPLOAD_MIME)
            .map_err(|e| Error::Channel(format!("Invalid MIME type: {e}")))?;

        let mut form = Form::new()
            .text("chat_id", chat_id.to_string())
            .text("supports_streaming", "true")
            .part("video", part);

        if let Some(reply) = reply_to {
            form = form.text("reply_to_message_id", reply.to_string());
        }

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::Channel(format!("Telegram sendVideo upload error: {e}")))?;

        let sent: SentMessage = self.read_result("sendVideo", response).await?;

        let media = sent.media_reference().ok_or_else(|| {
            Error::Channel("Telegram sendVideo returned no media file_id".to_string())
        })?;

        tracing::debug!(chat_id, size, kind = %media.kind, "Telegram video uploaded");
        Ok(media)
    }

    /// Get bot info to verify the token
    ///
    /// # Errors
    ///
    /// Returns error if the token is invalid
    pub async fn get_me(&self) -> Result<BotUser> {
        let url = format!("{API_BASE}{}/getMe", self.token);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Channel(format!("Telegram getMe error: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::Channel("Invalid Telegram bot token".to_string()));
        }

        self.read_result("getMe", response).await
    }

    /// Read a Bot API response and unwrap its `result`
    async fn read_result<T: DeserializeOwned>(
        &self,
        method: &str,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::Channel(format!("Telegram {method} response read error: {e}")))?;

        if self.debug {
            tracing::debug!(method, %status, body = %body, "Telegram API response");
        }

        let parsed: TelegramResponse<T> = serde_json::from_str(&body).map_err(|e| {
            Error::Channel(format!("Telegram {method} error: {status} - {body} ({e})"))
        })?;

        if !parsed.ok {
            return Err(Error::Channel(format!(
                "Telegram {method} error: {status} - {}",
                parsed.description.unwrap_or_default()
            )));
        }

        parsed
            .result
            .ok_or_else(|| Error::Channel(format!("Telegram {method} returned no result")))
    }
}

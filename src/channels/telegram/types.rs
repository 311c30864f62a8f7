//! Telegram Bot API request/response types

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::channels::{MediaKind, MediaRef};

/// Telegram Bot API base URL
pub(crate) const API_BASE: &str = "https://api.telegram.org/bot";

/// File name given to uploaded conversions
pub(crate) const UPLOAD_FILE_NAME: &str = "converted.mp4";

/// MIME type of uploaded conversions
pub(crate) const UPLOAD_MIME: &str = "video/mp4";

/// Telegram sendMessage request
#[derive(Serialize)]
pub(crate) struct SendMessageRequest {
    pub chat_id: i64,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_message_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_web_page_preview: Option<bool>,
}

/// Bot API method that resends media of `kind` by `file_id`
pub(crate) const fn resend_method(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Video => "sendVideo",
        MediaKind::Animation => "sendAnimation",
        MediaKind::Document => "sendDocument",
    }
}

/// Body for resending `media`; the `file_id` goes in the field named after its kind
pub(crate) fn resend_request(chat_id: i64, media: &MediaRef, reply_to: Option<i64>) -> Value {
    let mut body = json!({ "chat_id": chat_id });
    body[media.kind.as_str()] = json!(media.file_id);
    if media.kind == MediaKind::Video {
        body["supports_streaming"] = json!(true);
    }
    if let Some(reply) = reply_to {
        body["reply_to_message_id"] = json!(reply);
    }
    body
}

/// Telegram API response wrapper
#[derive(Debug, Deserialize)]
pub struct TelegramResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    pub description: Option<String>,
}

/// Bot identity from getMe
#[derive(Debug, Deserialize)]
pub struct BotUser {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

/// Any uploaded file as echoed back by the Bot API
#[derive(Debug, Deserialize)]
pub(crate) struct FileRef {
    pub file_id: String,
}

/// Message returned by send* methods
#[derive(Debug, Deserialize)]
pub(crate) struct SentMessage {
    #[allow(dead_code)]
    pub message_id: i64,
    #[serde(default)]
    pub video: Option<FileRef>,
    #[serde(default)]
    pub animation: Option<FileRef>,
    #[serde(default)]
    pub document: Option<FileRef>,
}

impl SentMessage {
    /// Reference of the media Telegram stored for this message
    ///
    /// Telegram files silent clips as animations and some containers as
    /// documents, so all three slots are checked and the kind is kept.
    pub fn media_reference(self) -> Option<MediaRef> {
        self.video
            .map(|f| MediaRef::new(MediaKind::Video, f.file_id))
            .or_else(|| {
                self.animation
                    .map(|f| MediaRef::new(MediaKind::Animation, f.file_id))
            })
            .or_else(|| {
                self.document
                    .map(|f| MediaRef::new(MediaKind::Document, f.file_id))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_reference_preferred() {
        let sent: SentMessage = serde_json::from_str(
            r#"{"message_id": 5, "video": {"file_id": "VID"}, "document": {"file_id": "DOC"}}"#,
        )
        .unwrap();
        assert_eq!(
            sent.media_reference(),
            Some(MediaRef::new(MediaKind::Video, "VID"))
        );
    }

    #[test]
    fn silent_clip_falls_back_to_animation() {
        let sent: SentMessage = serde_json::from_str(
            r#"{"message_id": 5, "animation": {"file_id": "ANIM"}, "document": {"file_id": "DOC"}}"#,
        )
        .unwrap();
        assert_eq!(
            sent.media_reference(),
            Some(MediaRef::new(MediaKind::Animation, "ANIM"))
        );
    }

    #[test]
    fn text_only_message_has_no_reference() {
        let sent: SentMessage = serde_json::from_str(r#"{"message_id": 5}"#).unwrap();
        assert!(sent.media_reference().is_none());
    }

    #[test]
    fn send_message_omits_unset_reply() {
        let request = SendMessageRequest {
            chat_id: 1,
            text: "hi".to_string(),
            reply_to_message_id: None,
            disable_web_page_preview: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("reply_to_message_id").is_none());
        assert_eq!(json["chat_id"], 1);
    }

    #[test]
    fn animation_is_resent_as_animation() {
        let media = MediaRef::new(MediaKind::Animation, "ANIM");
        assert_eq!(resend_method(media.kind), "sendAnimation");

        let body = resend_request(9, &media, Some(3));
        assert_eq!(body["animation"], "ANIM");
        assert_eq!(body["reply_to_message_id"], 3);
        assert!(body.get("video").is_none());
        assert!(body.get("supports_streaming").is_none());
    }

    #[test]
    fn video_resend_streams() {
        let body = resend_request(9, &MediaRef::new(MediaKind::Video, "VID"), None);
        assert_eq!(resend_method(MediaKind::Video), "sendVideo");
        assert_eq!(body["video"], "VID");
        assert_eq!(body["supports_streaming"], true);
        assert!(body.get("reply_to_message_id").is_none());
    }

    #[test]
    fn document_resend_method() {
        assert_eq!(resend_method(MediaKind::Document), "sendDocument");
    }
}

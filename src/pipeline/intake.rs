//! Intake filter and single-flight hand-off

use std::sync::LazyLock;

use regex::Regex;
use tokio::sync::mpsc;
use url::Url;

use super::{EXPECTED_EXTENSION, Request};
use crate::channels::IncomingMessage;

/// Whole-message URL whose path ends in `.webm` with nothing after it
static MEDIA_URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://[^\s/?#]+/[^\s?#]*\.webm$").expect("valid regex")
});

/// Why a message was not turned into a request
///
/// Rejections are silent: nothing is sent back to the chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Message has no text
    NoText,
    /// Message came from a chat other than the allowed one
    ForeignChat,
    /// Text is not a single http(s) link to a `.webm` file
    NotMediaUrl,
}

/// Whether `text` is exactly one http(s) URL with a host and a `.webm` path
#[must_use]
pub fn is_media_url(text: &str) -> bool {
    if !MEDIA_URL_RE.is_match(text) {
        return false;
    }

    Url::parse(text).is_ok_and(|url| {
        matches!(url.scheme(), "http" | "https")
            && url.host_str().is_some_and(|h| !h.is_empty())
            && url.path().ends_with(EXPECTED_EXTENSION)
            && url.query().is_none()
            && url.fragment().is_none()
    })
}

/// Create the hand-off between intake and the processor
///
/// Holds a single request, so intake waits while the processor is busy.
#[must_use]
pub fn handoff() -> (mpsc::Sender<Request>, mpsc::Receiver<Request>) {
    mpsc::channel(1)
}

/// Filters incoming messages and queues accepted requests
#[derive(Debug, Clone)]
pub struct Intake {
    allowed_chat_id: i64,
    tx: mpsc::Sender<Request>,
}

impl Intake {
    /// Accept only messages from `allowed_chat_id`, queueing onto `tx`
    #[must_use]
    pub const fn new(allowed_chat_id: i64, tx: mpsc::Sender<Request>) -> Self {
        Self {
            allowed_chat_id,
            tx,
        }
    }

    /// Decide whether `message` becomes a request without queueing it
    ///
    /// # Errors
    ///
    /// Returns the reason the message was rejected
    pub fn filter(&self, message: IncomingMessage) -> Result<Request, Rejection> {
        let text = message.text.ok_or(Rejection::NoText)?;

        if message.chat_id != self.allowed_chat_id {
            return Err(Rejection::ForeignChat);
        }

        if !is_media_url(&text) {
            return Err(Rejection::NotMediaUrl);
        }

        Ok(Request {
            chat_id: message.chat_id,
            message_id: message.message_id,
            url: text,
        })
    }

    /// Filter `message` and hand it to the processor
    ///
    /// Waits while the processor still holds a previous request. Returns
    /// `Ok(false)` if the processor has gone away.
    ///
    /// # Errors
    ///
    /// Returns the reason the message was rejected
    pub async fn accept(&self, message: IncomingMessage) -> Result<bool, Rejection> {
        let request = self.filter(message)?;
        tracing::info!(
            chat_id = request.chat_id,
            message_id = request.message_id,
            url = %request.url,
            "request accepted"
        );
        Ok(self.tx.send(request).await.is_ok())
    }
}

/// Feed channel messages through `intake` until either side closes
pub async fn run_intake(mut messages: mpsc::Receiver<IncomingMessage>, intake: Intake) {
    while let Some(message) = messages.recv().await {
        let chat_id = message.chat_id;
        let message_id = message.message_id;

        match intake.accept(message).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!("processor stopped, intake exiting");
                break;
            }
            Err(reason) => {
                tracing::debug!(chat_id, message_id, ?reason, "message ignored");
            }
        }
    }
}

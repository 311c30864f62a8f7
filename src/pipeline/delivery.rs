//! Replies to the requester through the channel

use std::path::Path;
use std::sync::Arc;

use super::{Failure, Request};
use crate::channels::{Channel, MediaRef};

/// Sends results and notices back into the originating chat
///
/// Every message is threaded as a reply to the request's message.
#[derive(Clone)]
pub struct Delivery {
    channel: Arc<dyn Channel>,
}

impl Delivery {
    /// Wrap a connected channel
    #[must_use]
    pub fn new(channel: Arc<dyn Channel>) -> Self {
        Self { channel }
    }

    /// Resend already uploaded media by reference
    ///
    /// # Errors
    ///
    /// Returns `SendFailed` if the channel rejects the send
    pub async fn deliver_cached(&self, request: &Request, media: &MediaRef) -> Result<(), Failure> {
        self.channel
            .send_media_by_reference(request.chat_id, Some(request.message_id), media)
            .await
            .map_err(|e| Failure::SendFailed(e.to_string()))
    }

    /// Upload a freshly converted file
    ///
    /// Returns the reference assigned by the channel.
    ///
    /// # Errors
    ///
    /// Returns `SendFailed` if the upload fails
    pub async fn deliver_fresh(&self, request: &Request, path: &Path) -> Result<MediaRef, Failure> {
        self.channel
            .upload_video(request.chat_id, Some(request.message_id), path)
            .await
            .map_err(|e| Failure::SendFailed(e.to_string()))
    }

    /// Tell the requester what went wrong
    ///
    /// A notice that cannot be sent is only logged.
    pub async fn deliver_error(&self, request: &Request, failure: &Failure) {
        let notice = failure.to_string();
        if let Err(e) = self
            .channel
            .send_text(request.chat_id, Some(request.message_id), &notice)
            .await
        {
            tracing::warn!(
                channel = self.channel.name(),
                chat_id = request.chat_id,
                message_id = request.message_id,
                error = %e,
                "failed to send error notice"
            );
        }
    }
}

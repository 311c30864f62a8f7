//! Telegram polling mode: getUpdates loop and message conversion

use serde::Deserialize;
use tokio::sync::mpsc;

use super::dedup::UpdateDedup;
use super::retry::{RetryPolicy, delay_for_attempt, is_recoverable, parse_retry_after};
use super::types::API_BASE;
use crate::channels::IncomingMessage;
use crate::{Error, Result};

/// Long-poll timeout passed to getUpdates, in seconds
const LONG_POLL_SECS: u64 = 30;

/// Response from Telegram getUpdates API
#[derive(Debug, Deserialize)]
struct GetUpdatesResponse {
    #[allow(dead_code)]
    ok: bool,
    result: Vec<PollingUpdate>,
}

/// A single update from getUpdates
#[derive(Debug, Deserialize)]
struct PollingUpdate {
    update_id: i64,
    message: Option<PollingMessage>,
}

/// Message from a polling update
#[derive(Debug, Deserialize)]
struct PollingMessage {
    message_id: i64,
    chat: PollingChat,
    text: Option<String>,
}

/// Chat info from polling
#[derive(Debug, Deserialize)]
struct PollingChat {
    id: i64,
}

impl super::TelegramChannel {
    /// Spawn a background task that polls Telegram's getUpdates API
    ///
    /// Polls every `interval` and forwards received messages into the mpsc channel.
    /// Deletes any existing webhook before starting to avoid conflicts. The task
    /// ends when the receiving side is dropped.
    ///
    /// # Errors
    ///
    /// Returns error if the channel was not created with [`Self::with_receiver`]
    pub fn start_polling(
        &self,
        interval: std::time::Duration,
    ) -> Result<tokio::task::JoinHandle<()>> {
        let token = self.token.clone();
        let client = self.client.clone();
        let debug = self.debug;
        let tx = self.message_tx.clone().ok_or_else(|| {
            Error::Channel("start_polling requires a message_tx (use with_receiver)".to_string())
        })?;

        Ok(tokio::spawn(async move {
            polling_loop(token, client, tx, interval, debug).await;
        }))
    }
}

/// Run the polling loop (background task)
async fn polling_loop(
    token: String,
    client: reqwest::Client,
    tx: mpsc::Sender<IncomingMessage>,
    interval: std::time::Duration,
    debug: bool,
) {
    // Delete any existing webhook so getUpdates works
    let delete_url = format!("{API_BASE}{token}/deleteWebhook");
    if let Err(e) = client.post(&delete_url).send().await {
        tracing::warn!(error = %e, "failed to delete Telegram webhook before polling");
    }

    let policy = RetryPolicy::default();
    let mut failures: u32 = 0;
    let mut offset: Option<i64> = None;
    let mut dedup = UpdateDedup::default();

    loop {
        let url = format!("{API_BASE}{token}/getUpdates");
        let mut params = serde_json::json!({
            "timeout": LONG_POLL_SECS,
            "allowed_updates": ["message"],
        });
        if let Some(off) = offset {
            params["offset"] = serde_json::json!(off);
        }

        let batch = match client.post(&url).json(&params).send().await {
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                if debug {
                    tracing::debug!(%status, body = %body, "Telegram getUpdates response");
                }

                if status.is_success() {
                    serde_json::from_str::<GetUpdatesResponse>(&body)
                        .map_err(|e| (format!("unparsable getUpdates body: {e}"), None))
                } else {
                    if is_recoverable(status.as_u16(), &body) {
                        tracing::warn!(%status, "Telegram getUpdates failed, retrying");
                    } else {
                        tracing::error!(%status, body = %body, "Telegram getUpdates rejected");
                    }
                    Err((format!("status {status}"), parse_retry_after(&body)))
                }
            }
            Err(e) => Err((e.to_string(), None)),
        };

        match batch {
            Ok(updates) => {
                failures = 0;
                for update in &updates.result {
                    // Advance offset past this update
                    offset = Some(update.update_id + 1);

                    let key = format!("poll:{}", update.update_id);
                    if dedup.is_duplicate(&key) {
                        continue;
                    }

                    if let Some(msg) = update_to_incoming(update)
                        && tx.send(msg).await.is_err()
                    {
                        tracing::info!("incoming receiver closed, stopping Telegram polling");
                        return;
                    }
                }
                tokio::time::sleep(interval).await;
            }
            Err((reason, retry_after)) => {
                let delay = delay_for_attempt(&policy, failures, retry_after);
                failures = failures.saturating_add(1);
                tracing::warn!(error = %reason, attempt = failures, ?delay, "Telegram getUpdates error");
                tokio::time::sleep(delay).await;
            }
        }

        if tx.is_closed() {
            tracing::info!("incoming receiver closed, stopping Telegram polling");
            return;
        }
    }
}

/// Convert a polling update into an `IncomingMessage`
///
/// Non-message updates yield `None`; messages without text are still
/// forwarded so intake can make the decision.
fn update_to_incoming(update: &PollingUpdate) -> Option<IncomingMessage> {
    let msg = update.message.as_ref()?;

    Some(IncomingMessage {
        chat_id: msg.chat.id,
        message_id: msg.message_id,
        text: msg.text.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> GetUpdatesResponse {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn text_message_is_converted() {
        let updates = parse(
            r#"{"ok": true, "result": [{
                "update_id": 10,
                "message": {
                    "message_id": 77,
                    "chat": {"id": -100500, "type": "supergroup"},
                    "from": {"id": 1, "is_bot": false, "first_name": "A"},
                    "text": "https://example.com/a.webm"
                }
            }]}"#,
        );

        let msg = update_to_incoming(&updates.result[0]).unwrap();
        assert_eq!(
            msg,
            IncomingMessage::text(-100_500, 77, "https://example.com/a.webm")
        );
    }

    #[test]
    fn media_message_has_no_text() {
        let updates = parse(
            r#"{"ok": true, "result": [{
                "update_id": 11,
                "message": {
                    "message_id": 78,
                    "chat": {"id": 5, "type": "private"},
                    "photo": [{"file_id": "x"}]
                }
            }]}"#,
        );

        let msg = update_to_incoming(&updates.result[0]).unwrap();
        assert!(msg.text.is_none());
    }

    #[test]
    fn non_message_update_is_skipped() {
        let updates = parse(r#"{"ok": true, "result": [{"update_id": 12}]}"#);
        assert!(update_to_incoming(&updates.result[0]).is_none());
    }
}

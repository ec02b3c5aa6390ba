use super::traits::ChatPlatform;
use crate::config::TelegramConfig;
use crate::providers::sanitize_api_error;
use crate::util::truncate_with_ellipsis;
use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;

/// Telegram's maximum message length for text messages
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;
/// Reserve space for continuation markers added by `send_text`:
/// worst case is "(continued)\n\n" + chunk + "\n\n(continues...)" = 30 extra chars
const TELEGRAM_CONTINUATION_OVERHEAD: usize = 30;
/// Telegram's maximum photo caption length
const TELEGRAM_MAX_CAPTION_LENGTH: usize = 1024;

// ── Inbound update ───────────────────────────────────────────────

/// The subset of a Telegram `Update` the webhook pipeline reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelegramUpdate {
    #[serde(default)]
    pub update_id: Option<i64>,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramMessage {
    pub chat: TelegramChat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
}

impl TelegramUpdate {
    /// `(chat_id, text)` when the update carries a text message.
    pub fn chat_text(&self) -> Option<(i64, &str)> {
        let message = self.message.as_ref()?;
        let text = message.text.as_deref()?;
        Some((message.chat.id, text))
    }
}

/// Identity returned by `getMe`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BotIdentity {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    description: Option<String>,
}

// ── Message splitting ────────────────────────────────────────────

/// Split a message into chunks that respect Telegram's 4096 character limit.
/// Tries to split at word boundaries when possible, and handles continuation.
/// The effective per-chunk limit is reduced to leave room for continuation markers.
fn split_message_for_telegram(message: &str) -> Vec<String> {
    if message.chars().count() <= TELEGRAM_MAX_MESSAGE_LENGTH {
        return vec![message.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = message;
    let chunk_limit = TELEGRAM_MAX_MESSAGE_LENGTH - TELEGRAM_CONTINUATION_OVERHEAD;

    while !remaining.is_empty() {
        if remaining.chars().count() <= chunk_limit {
            chunks.push(remaining.to_string());
            break;
        }

        let hard_split = remaining
            .char_indices()
            .nth(chunk_limit)
            .map_or(remaining.len(), |(idx, _)| idx);

        let search_area = &remaining[..hard_split];
        let chunk_end = match search_area.rfind('\n') {
            Some(pos) if search_area[..pos].chars().count() >= chunk_limit / 2 => pos + 1,
            _ => match search_area.rfind(' ') {
                Some(pos) if pos > 0 => pos + 1,
                _ => hard_split,
            },
        };

        chunks.push(remaining[..chunk_end].to_string());
        remaining = &remaining[chunk_end..];
    }

    chunks
}

fn with_continuation_markers(chunks: Vec<String>) -> Vec<String> {
    let total = chunks.len();
    if total <= 1 {
        return chunks;
    }
    chunks
        .into_iter()
        .enumerate()
        .map(|(index, chunk)| {
            let mut text = String::new();
            if index > 0 {
                text.push_str("(continued)\n\n");
            }
            text.push_str(&chunk);
            if index + 1 < total {
                text.push_str("\n\n(continues...)");
            }
            text
        })
        .collect()
}

// ── Client ───────────────────────────────────────────────────────

/// Telegram Bot API client shared by every tenant.
pub struct TelegramClient {
    api_base: String,
    timeout_secs: u64,
    connect_timeout_secs: u64,
}

impl TelegramClient {
    pub fn new(api_base: &str) -> Self {
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            timeout_secs: 15,
            connect_timeout_secs: 5,
        }
    }

    pub fn from_config(config: &TelegramConfig) -> Self {
        Self {
            timeout_secs: config.timeout_secs,
            connect_timeout_secs: config.connect_timeout_secs,
            ..Self::new(&config.api_base)
        }
    }

    fn http_client(&self) -> reqwest::Client {
        crate::config::build_client_with_timeouts(
            "channel.telegram",
            self.timeout_secs,
            self.connect_timeout_secs,
        )
    }

    fn api_url(&self, token: &str, method: &str) -> String {
        format!("{}/bot{token}/{method}", self.api_base)
    }

    /// POST `body` to `method` and return `result` when Telegram reports `ok`.
    async fn call(
        &self,
        token: &str,
        method: &str,
        body: &serde_json::Value,
    ) -> anyhow::Result<serde_json::Value> {
        let resp = self
            .http_client()
            .post(self.api_url(token, method))
            .json(body)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Telegram {method} request failed: {}", e.without_url()))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| anyhow::anyhow!("Telegram {method} body unreadable: {}", e.without_url()))?;

        let envelope: ApiEnvelope = match serde_json::from_str(&text) {
            Ok(envelope) => envelope,
            Err(_) => anyhow::bail!(
                "Telegram {method} failed ({status}): {}",
                sanitize_api_error(&text)
            ),
        };

        if !status.is_success() || !envelope.ok {
            anyhow::bail!(
                "Telegram {method} failed ({status}): {}",
                sanitize_api_error(envelope.description.as_deref().unwrap_or("no description"))
            );
        }

        Ok(envelope.result.unwrap_or(serde_json::Value::Null))
    }

    /// Resolve the bot behind `token`.
    pub async fn get_me(&self, token: &str) -> anyhow::Result<BotIdentity> {
        let result = self.call(token, "getMe", &serde_json::json!({})).await?;
        serde_json::from_value(result).context("Bot identity not found in getMe response")
    }

    /// Subscribe the bot to updates delivered at `url`.
    pub async fn set_webhook(&self, token: &str, url: &str) -> anyhow::Result<()> {
        self.call(token, "setWebhook", &serde_json::json!({ "url": url }))
            .await?;
        tracing::info!("Telegram webhook set: {url}");
        Ok(())
    }

    pub async fn delete_webhook(&self, token: &str) -> anyhow::Result<()> {
        self.call(token, "deleteWebhook", &serde_json::json!({}))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ChatPlatform for TelegramClient {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn send_text(&self, token: &str, chat_id: i64, text: &str) -> bool {
        let chunks = with_continuation_markers(split_message_for_telegram(text));
        let mut delivered = true;
        for chunk in chunks {
            let body = serde_json::json!({
                "chat_id": chat_id,
                "text": chunk,
            });
            if let Err(e) = self.call(token, "sendMessage", &body).await {
                tracing::error!(chat_id, "Failed to send Telegram message: {e}");
                delivered = false;
            }
        }
        delivered
    }

    async fn send_photo(&self, token: &str, chat_id: i64, photo_url: &str, caption: &str) -> bool {
        let body = serde_json::json!({
            "chat_id": chat_id,
            "photo": photo_url,
            "caption": truncate_with_ellipsis(caption, TELEGRAM_MAX_CAPTION_LENGTH - 3),
        });
        match self.call(token, "sendPhoto", &body).await {
            Ok(_) => {
                tracing::debug!(chat_id, "Telegram photo (URL) sent: {photo_url}");
                true
            }
            Err(e) => {
                tracing::error!(chat_id, "Failed to send Telegram photo {photo_url}: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_url_embeds_token_and_method() {
        let client = TelegramClient::new("https://api.telegram.org/");
        assert_eq!(
            client.api_url("123:ABC", "getMe"),
            "https://api.telegram.org/bot123:ABC/getMe"
        );
    }

    #[test]
    fn short_message_is_single_chunk() {
        let chunks = split_message_for_telegram("hello");
        assert_eq!(chunks, vec!["hello".to_string()]);
        assert_eq!(with_continuation_markers(chunks), vec!["hello".to_string()]);
    }

    #[test]
    fn long_message_splits_within_limit() {
        let message = "word ".repeat(2000);
        let chunks = with_continuation_markers(split_message_for_telegram(&message));
        assert!(chunks.len() > 1);
        assert!(chunks
            .iter()
            .all(|c| c.chars().count() <= TELEGRAM_MAX_MESSAGE_LENGTH));
        assert!(chunks[0].ends_with("(continues...)"));
        assert!(chunks[1].starts_with("(continued)"));
    }

    #[test]
    fn split_prefers_newlines_and_keeps_all_text() {
        let line = "x".repeat(100);
        let message = std::iter::repeat(line.as_str())
            .take(60)
            .collect::<Vec<_>>()
            .join("\n");
        let chunks = split_message_for_telegram(&message);
        assert!(chunks.len() > 1);
        assert!(chunks[0].ends_with('\n'));
        assert_eq!(chunks.concat(), message);
    }

    #[test]
    fn split_without_whitespace_hard_splits_on_char_boundary() {
        let message = "я".repeat(5000);
        let chunks = split_message_for_telegram(&message);
        assert_eq!(chunks.concat(), message);
        assert!(chunks.iter().all(|c| c.chars().count() <= TELEGRAM_MAX_MESSAGE_LENGTH));
    }

    #[test]
    fn update_exposes_chat_and_text() {
        let update: TelegramUpdate = serde_json::from_str(
            r#"{"update_id":1,"message":{"message_id":5,"chat":{"id":42,"type":"private"},"text":"hi"}}"#,
        )
        .unwrap();
        assert_eq!(update.chat_text(), Some((42, "hi")));
    }

    #[test]
    fn update_without_text_or_message_yields_none() {
        let photo_only: TelegramUpdate =
            serde_json::from_str(r#"{"message":{"chat":{"id":42},"photo":[]}}"#).unwrap();
        assert_eq!(photo_only.chat_text(), None);

        let edited: TelegramUpdate =
            serde_json::from_str(r#"{"update_id":2,"edited_message":{"chat":{"id":1}}}"#).unwrap();
        assert_eq!(edited.chat_text(), None);
    }

    #[test]
    fn bot_identity_parses_get_me_result() {
        let identity: BotIdentity = serde_json::from_value(serde_json::json!({
            "id": 987654,
            "is_bot": true,
            "first_name": "Shop",
            "username": "shopbot"
        }))
        .unwrap();
        assert_eq!(identity.id, 987_654);
        assert_eq!(identity.username.as_deref(), Some("shopbot"));
    }
}

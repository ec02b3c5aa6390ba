use async_trait::async_trait;

/// Outbound side of a chat platform.
///
/// Tokens are passed per call because every tenant has its own bot.
/// Sends never fail outward: delivery problems are logged and reported as
/// `false`.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Human-readable platform name
    fn name(&self) -> &str;

    /// Send a text message, splitting it when the platform requires it.
    async fn send_text(&self, token: &str, chat_id: i64, text: &str) -> bool;

    /// Send a photo referenced by URL with a caption.
    async fn send_photo(&self, token: &str, chat_id: i64, photo_url: &str, caption: &str) -> bool;
}

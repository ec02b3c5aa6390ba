//! Chat platform integrations.
//!
//! Outbound delivery goes through the [`ChatPlatform`] trait defined in
//! [`traits`]; Telegram is the only platform wired in. The Telegram client
//! also carries the Bot API calls used at registration time (`getMe`,
//! `setWebhook`, `deleteWebhook`).

pub mod telegram;
pub mod traits;

pub use telegram::{BotIdentity, TelegramClient, TelegramUpdate};
pub use traits::ChatPlatform;

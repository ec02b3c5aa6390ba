//! Free-text conversation flow: history + catalog grounding → completion →
//! usage ledger → persisted turns.

pub mod context;

use crate::config::Config;
use crate::cost::UsageTracker;
use crate::providers::Provider;
use crate::store::{CatalogStore, ConversationStore, Role, Tenant};
use std::sync::Arc;

/// Knobs of the conversation flow, taken from `[provider]`, `[conversation]`
/// and `[catalog]`.
#[derive(Debug, Clone)]
pub struct AssistantSettings {
    pub model: String,
    pub temperature: f64,
    pub history_limit: usize,
    pub fallback_reply: String,
    pub currency_label: String,
}

impl From<&Config> for AssistantSettings {
    fn from(config: &Config) -> Self {
        Self {
            model: config.provider.model.clone(),
            temperature: config.provider.temperature,
            history_limit: config.conversation.history_limit,
            fallback_reply: config.conversation.fallback_reply.clone(),
            currency_label: config.catalog.currency_label.clone(),
        }
    }
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Outcome of one free-text exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// The model answered and both turns were handed to the store.
    Answered(String),
    /// Something failed before an answer existed; nothing was persisted.
    Fallback(String),
}

impl Reply {
    pub fn text(&self) -> &str {
        match self {
            Self::Answered(text) | Self::Fallback(text) => text,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }
}

pub struct Assistant {
    conversations: Arc<dyn ConversationStore>,
    catalog: Arc<dyn CatalogStore>,
    provider: Arc<dyn Provider>,
    usage: Arc<UsageTracker>,
    settings: AssistantSettings,
}

impl Assistant {
    pub fn new(
        conversations: Arc<dyn ConversationStore>,
        catalog: Arc<dyn CatalogStore>,
        provider: Arc<dyn Provider>,
        usage: Arc<UsageTracker>,
        settings: AssistantSettings,
    ) -> Self {
        Self {
            conversations,
            catalog,
            provider,
            usage,
            settings,
        }
    }

    pub fn settings(&self) -> &AssistantSettings {
        &self.settings
    }

    /// Answer `text` from `chat_id` on behalf of `tenant`.
    ///
    /// Never fails: any error before the model answers yields the configured
    /// fallback and leaves the conversation log untouched.
    pub async fn reply(&self, tenant: &Tenant, chat_id: i64, text: &str) -> Reply {
        let history = match self.conversations.recent_turns(
            chat_id,
            &tenant.identifier,
            self.settings.history_limit,
        ) {
            Ok(history) => history,
            Err(e) => {
                tracing::error!(tenant = %tenant.identifier, chat_id, "Failed to load history: {e:#}");
                return self.fallback();
            }
        };

        let products = match self.catalog.products_for_tenant(tenant.id) {
            Ok(products) => products,
            Err(e) => {
                tracing::error!(tenant = %tenant.identifier, chat_id, "Failed to load catalog: {e:#}");
                return self.fallback();
            }
        };

        let catalog_text = context::render_catalog(&products, &self.settings.currency_label);
        let system = context::system_prompt(tenant.shop_label(), &catalog_text);
        let messages = context::build_messages(system, &history, text);

        tracing::debug!(
            tenant = %tenant.identifier,
            chat_id,
            history = history.len(),
            products = products.len(),
            "Requesting completion"
        );

        let response = match self
            .provider
            .chat(&messages, &self.settings.model, self.settings.temperature)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(tenant = %tenant.identifier, chat_id, "Completion failed: {e:#}");
                return self.fallback();
            }
        };

        if let Some(usage) = response.usage {
            if let Err(e) = self.usage.record(&tenant.identifier, chat_id, &usage) {
                tracing::warn!(tenant = %tenant.identifier, chat_id, "Failed to record usage: {e:#}");
            }
        } else {
            tracing::debug!(tenant = %tenant.identifier, "Completion carried no usage block");
        }

        for (role, content) in [(Role::User, text), (Role::Assistant, response.text.as_str())] {
            if let Err(e) = self
                .conversations
                .append_turn(chat_id, &tenant.identifier, role, content)
            {
                tracing::error!(
                    tenant = %tenant.identifier,
                    chat_id,
                    role = role.as_str(),
                    "Failed to persist conversation turn: {e:#}"
                );
            }
        }

        Reply::Answered(response.text)
    }

    fn fallback(&self) -> Reply {
        Reply::Fallback(self.settings.fallback_reply.clone())
    }
}

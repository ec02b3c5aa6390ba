use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Chat platform a tenant is registered on.
pub const PLATFORM_TELEGRAM: &str = "telegram";

/// A registered shop bot and its owner.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: i64,
    pub display_name: String,
    /// Public identifier, also the last segment of the webhook path.
    pub identifier: String,
    pub platform: String,
    /// Bot API token. Secret, never logged.
    #[serde(skip_serializing)]
    pub access_token: String,
    /// Numeric bot id reported by the platform.
    pub platform_api_id: i64,
    pub shop_name: Option<String>,
    pub owner_id: i64,
    pub description: Option<String>,
}

impl Tenant {
    /// Name shown to customers: the shop name when set, else the display name.
    pub fn shop_label(&self) -> &str {
        self.shop_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.display_name)
    }
}

impl fmt::Debug for Tenant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tenant")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("identifier", &self.identifier)
            .field("platform", &self.platform)
            .field("access_token", &"[REDACTED]")
            .field("platform_api_id", &self.platform_api_id)
            .field("shop_name", &self.shop_name)
            .field("owner_id", &self.owner_id)
            .field("description", &self.description)
            .finish()
    }
}

/// Tenant fields before the row id is assigned.
#[derive(Clone)]
pub struct NewTenant {
    pub display_name: String,
    pub identifier: String,
    pub platform: String,
    pub access_token: String,
    pub platform_api_id: i64,
    pub shop_name: Option<String>,
    pub owner_id: i64,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub tenant_id: i64,
    pub name: String,
    pub price: Decimal,
    pub description: Option<String>,
    pub catalog: String,
    pub subcategory: String,
    pub image_url: Option<String>,
    pub in_stock: bool,
}

impl Product {
    /// Image URL when present and non-blank.
    pub fn image(&self) -> Option<&str> {
        self.image_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewProduct {
    pub tenant_id: i64,
    pub name: String,
    pub price: Decimal,
    pub description: Option<String>,
    pub catalog: String,
    pub subcategory: String,
    pub image_url: Option<String>,
    pub in_stock: bool,
}

/// Author of a stored conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl TryFrom<&str> for Role {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => anyhow::bail!("unknown conversation role: {other}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Monotonic insertion order.
    pub id: i64,
    pub role: Role,
    pub content: String,
    pub chat_id: i64,
    pub tenant_identifier: String,
}

/// Tokens and cost of one completion call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub tenant_identifier: String,
    pub chat_id: i64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub cost_usd: f64,
    pub cost_local: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsageStats {
    pub bot_identifier: String,
    pub total_requests: u64,
    pub total_prompt_tokens: u64,
    pub total_completion_tokens: u64,
    pub total_cost_usd: f64,
    pub total_cost_local: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationStats {
    pub total_messages: u64,
    /// Distinct chats that talked to the tenant.
    pub total_dialogues: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant() -> Tenant {
        Tenant {
            id: 1,
            display_name: "Shop Bot".into(),
            identifier: "shopbot".into(),
            platform: PLATFORM_TELEGRAM.into(),
            access_token: "123:secret".into(),
            platform_api_id: 42,
            shop_name: None,
            owner_id: 7,
            description: None,
        }
    }

    #[test]
    fn shop_label_prefers_shop_name() {
        let mut t = tenant();
        assert_eq!(t.shop_label(), "Shop Bot");
        t.shop_name = Some("  ".into());
        assert_eq!(t.shop_label(), "Shop Bot");
        t.shop_name = Some("Mugs & Co".into());
        assert_eq!(t.shop_label(), "Mugs & Co");
    }

    #[test]
    fn debug_redacts_access_token() {
        let rendered = format!("{:?}", tenant());
        assert!(!rendered.contains("123:secret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn blank_image_url_is_treated_as_missing() {
        let mut product = Product {
            id: 1,
            tenant_id: 1,
            name: "Mug".into(),
            price: Decimal::new(1000, 2),
            description: None,
            catalog: "Kitchen".into(),
            subcategory: "Cups".into(),
            image_url: Some("   ".into()),
            in_stock: true,
        };
        assert_eq!(product.image(), None);
        product.image_url = Some("http://x/mug.jpg".into());
        assert_eq!(product.image(), Some("http://x/mug.jpg"));
    }

    #[test]
    fn role_round_trips_through_str() {
        assert_eq!(Role::try_from("user").unwrap(), Role::User);
        assert_eq!(Role::try_from(Role::Assistant.as_str()).unwrap(), Role::Assistant);
        assert!(Role::try_from("system").is_err());
    }
}

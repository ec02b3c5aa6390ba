//! Tenant administration: registration against the Bot API, owner-checked
//! updates and removal.

pub mod products;

pub use products::{CatalogError, ImageStore, ProductDraft, ProductService};

use crate::channels::TelegramClient;
use crate::providers::sanitize_api_error;
use crate::store::{NewTenant, Tenant, TenantRegistry, PLATFORM_TELEGRAM};
use crate::util::mask_secret;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("bot not found")]
    NotFound,
    #[error("bot does not belong to this user")]
    NotOwner,
    #[error("bot identifier '{0}' is already registered")]
    DuplicateIdentifier(String),
    #[error("access token is already registered")]
    DuplicateToken,
    #[error("Telegram bot id {0} is already registered")]
    DuplicatePlatformId(i64),
    #[error("access token rejected by Telegram: {0}")]
    TokenRejected(String),
    #[error("token belongs to @{actual}, not @{claimed}")]
    IdentifierMismatch { claimed: String, actual: String },
    #[error("webhook subscription failed: {0}")]
    Webhook(String),
    #[error("invalid input: {0}")]
    Invalid(String),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Fields supplied by an owner registering a bot.
#[derive(Clone)]
pub struct NewTenantRequest {
    pub display_name: String,
    /// Telegram username of the bot, with or without a leading `@`.
    pub identifier: String,
    pub access_token: String,
    pub shop_name: Option<String>,
    pub description: Option<String>,
}

/// Optional changes to a tenant's descriptive fields.
#[derive(Debug, Clone, Default)]
pub struct TenantPatch {
    pub display_name: Option<String>,
    pub shop_name: Option<String>,
    pub description: Option<String>,
}

/// Webhook URL Telegram should deliver `identifier`'s updates to.
pub fn webhook_url(base_url: &str, identifier: &str) -> String {
    format!(
        "{}/api/telegram/webhook/{identifier}",
        base_url.trim_end_matches('/')
    )
}

pub struct TenantService {
    registry: Arc<dyn TenantRegistry>,
    telegram: Arc<TelegramClient>,
    webhook_base_url: Option<String>,
}

impl TenantService {
    pub fn new(
        registry: Arc<dyn TenantRegistry>,
        telegram: Arc<TelegramClient>,
        webhook_base_url: Option<String>,
    ) -> Self {
        Self {
            registry,
            telegram,
            webhook_base_url: webhook_base_url.filter(|url| !url.trim().is_empty()),
        }
    }

    /// Validate the token with `getMe`, persist the tenant, subscribe its webhook.
    pub async fn register(
        &self,
        owner_id: i64,
        request: NewTenantRequest,
    ) -> Result<Tenant, RegistryError> {
        let identifier = request.identifier.trim().trim_start_matches('@').to_string();
        let access_token = request.access_token.trim().to_string();
        let display_name = request.display_name.trim().to_string();
        if identifier.is_empty() || access_token.is_empty() || display_name.is_empty() {
            return Err(RegistryError::Invalid(
                "name, identifier and access token are required".into(),
            ));
        }

        if self.registry.find_by_identifier(&identifier)?.is_some() {
            return Err(RegistryError::DuplicateIdentifier(identifier));
        }
        if self.registry.find_by_token(&access_token)?.is_some() {
            return Err(RegistryError::DuplicateToken);
        }

        let identity = self
            .telegram
            .get_me(&access_token)
            .await
            .map_err(|e| RegistryError::TokenRejected(sanitize_api_error(&format!("{e:#}"))))?;

        let username = identity.username.unwrap_or_default();
        if !username.eq_ignore_ascii_case(&identifier) {
            return Err(RegistryError::IdentifierMismatch {
                claimed: identifier,
                actual: username,
            });
        }
        if self.registry.find_by_platform_id(identity.id)?.is_some() {
            return Err(RegistryError::DuplicatePlatformId(identity.id));
        }

        let tenant = self.registry.insert_tenant(NewTenant {
            display_name,
            identifier,
            platform: PLATFORM_TELEGRAM.into(),
            access_token,
            platform_api_id: identity.id,
            shop_name: non_blank(request.shop_name),
            owner_id,
            description: non_blank(request.description),
        })?;

        match &self.webhook_base_url {
            Some(base) => {
                let url = webhook_url(base, &tenant.identifier);
                if let Err(e) = self.telegram.set_webhook(&tenant.access_token, &url).await {
                    if let Err(cleanup) = self.registry.delete_tenant(tenant.id) {
                        tracing::error!(tenant = %tenant.identifier, "Failed to roll back registration: {cleanup:#}");
                    }
                    return Err(RegistryError::Webhook(format!("{e:#}")));
                }
            }
            None => tracing::warn!(
                tenant = %tenant.identifier,
                "No webhook base URL configured; webhook not subscribed"
            ),
        }

        tracing::info!(
            tenant = %tenant.identifier,
            owner_id,
            token = %mask_secret(&tenant.access_token),
            platform_api_id = tenant.platform_api_id,
            "Bot registered"
        );
        Ok(tenant)
    }

    pub fn list(&self, owner_id: i64) -> Result<Vec<Tenant>, RegistryError> {
        Ok(self.registry.list_by_owner(owner_id)?)
    }

    /// Load a tenant and check it belongs to `owner_id`.
    pub fn owned(&self, tenant_id: i64, owner_id: i64) -> Result<Tenant, RegistryError> {
        let tenant = self
            .registry
            .find_by_id(tenant_id)?
            .ok_or(RegistryError::NotFound)?;
        if tenant.owner_id != owner_id {
            return Err(RegistryError::NotOwner);
        }
        Ok(tenant)
    }

    pub fn update(
        &self,
        tenant_id: i64,
        owner_id: i64,
        patch: TenantPatch,
    ) -> Result<Tenant, RegistryError> {
        let mut tenant = self.owned(tenant_id, owner_id)?;
        if let Some(name) = patch.display_name {
            let name = name.trim();
            if name.is_empty() {
                return Err(RegistryError::Invalid("display name must not be blank".into()));
            }
            tenant.display_name = name.to_string();
        }
        if patch.shop_name.is_some() {
            tenant.shop_name = non_blank(patch.shop_name);
        }
        if patch.description.is_some() {
            tenant.description = non_blank(patch.description);
        }
        self.registry.update_tenant(&tenant)?;
        Ok(tenant)
    }

    pub fn set_shop_name(
        &self,
        tenant_id: i64,
        owner_id: i64,
        shop_name: &str,
    ) -> Result<Tenant, RegistryError> {
        self.update(
            tenant_id,
            owner_id,
            TenantPatch {
                shop_name: Some(shop_name.to_string()),
                ..TenantPatch::default()
            },
        )
    }

    /// Drop the webhook subscription (best effort), then the tenant.
    pub async fn delete(&self, tenant_id: i64, owner_id: i64) -> Result<(), RegistryError> {
        let tenant = self.owned(tenant_id, owner_id)?;
        if let Err(e) = self.telegram.delete_webhook(&tenant.access_token).await {
            tracing::warn!(tenant = %tenant.identifier, "Failed to delete webhook: {e:#}");
        }
        self.registry.delete_tenant(tenant.id)?;
        tracing::info!(tenant = %tenant.identifier, owner_id, "Bot removed");
        Ok(())
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;

    fn service(store: Arc<SqliteStore>) -> TenantService {
        // Unroutable API base: these tests never reach the network.
        TenantService::new(
            store,
            Arc::new(TelegramClient::new("http://127.0.0.1:9")),
            None,
        )
    }

    fn seed(store: &SqliteStore, owner_id: i64) -> Tenant {
        store
            .insert_tenant(NewTenant {
                display_name: "Shop".into(),
                identifier: "shopbot".into(),
                platform: PLATFORM_TELEGRAM.into(),
                access_token: "1:tok".into(),
                platform_api_id: 1,
                shop_name: None,
                owner_id,
                description: None,
            })
            .unwrap()
    }

    fn request(identifier: &str, token: &str) -> NewTenantRequest {
        NewTenantRequest {
            display_name: "Shop".into(),
            identifier: identifier.into(),
            access_token: token.into(),
            shop_name: None,
            description: None,
        }
    }

    #[test]
    fn webhook_url_joins_base_and_identifier() {
        assert_eq!(
            webhook_url("https://shop.example.com/", "shopbot"),
            "https://shop.example.com/api/telegram/webhook/shopbot"
        );
    }

    #[tokio::test]
    async fn register_rejects_duplicates_before_calling_telegram() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        seed(&store, 1);
        let service = service(store);

        let err = service.register(1, request("@shopbot", "2:new")).await.unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateIdentifier(id) if id == "shopbot"));

        let err = service.register(1, request("other", "1:tok")).await.unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateToken));
    }

    #[tokio::test]
    async fn register_requires_fields() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let err = service(store).register(1, request(" ", "1:x")).await.unwrap_err();
        assert!(matches!(err, RegistryError::Invalid(_)));
    }

    #[test]
    fn update_checks_owner_and_trims() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let tenant = seed(&store, 1);
        let service = service(store);

        assert!(matches!(
            service.set_shop_name(tenant.id, 2, "Stolen"),
            Err(RegistryError::NotOwner)
        ));
        assert!(matches!(
            service.set_shop_name(tenant.id + 100, 1, "Nope"),
            Err(RegistryError::NotFound)
        ));

        let updated = service.set_shop_name(tenant.id, 1, "  Mugs & Co ").unwrap();
        assert_eq!(updated.shop_name.as_deref(), Some("Mugs & Co"));

        let cleared = service
            .update(
                tenant.id,
                1,
                TenantPatch {
                    shop_name: Some(String::new()),
                    description: Some("Handmade".into()),
                    ..TenantPatch::default()
                },
            )
            .unwrap();
        assert!(cleared.shop_name.is_none());
        assert_eq!(cleared.description.as_deref(), Some("Handmade"));
    }

    #[test]
    fn list_is_scoped_to_owner() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        seed(&store, 1);
        let service = service(store);
        assert_eq!(service.list(1).unwrap().len(), 1);
        assert!(service.list(2).unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_removes_row_even_when_webhook_call_fails() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let tenant = seed(&store, 1);
        let service = service(store.clone());

        assert!(matches!(
            service.delete(tenant.id, 2).await,
            Err(RegistryError::NotOwner)
        ));
        service.delete(tenant.id, 1).await.unwrap();
        assert!(store.find_by_id(tenant.id).unwrap().is_none());
    }
}

//! Persistence for tenants, catalogs, conversation turns and usage records.
//!
//! The traits are synchronous; every call is a single short SQLite statement
//! or transaction and is made directly from request handlers.

pub mod models;
pub mod sqlite;

pub use models::{
    ConversationStats, ConversationTurn, NewProduct, NewTenant, Product, Role, Tenant,
    TokenUsageStats, UsageRecord, PLATFORM_TELEGRAM,
};
pub use sqlite::SqliteStore;

use anyhow::Result;

/// Tenants keyed by identifier, token, platform id and row id.
pub trait TenantRegistry: Send + Sync {
    fn find_by_identifier(&self, identifier: &str) -> Result<Option<Tenant>>;
    fn find_by_id(&self, id: i64) -> Result<Option<Tenant>>;
    fn find_by_token(&self, access_token: &str) -> Result<Option<Tenant>>;
    fn find_by_platform_id(&self, platform_api_id: i64) -> Result<Option<Tenant>>;
    fn list_by_owner(&self, owner_id: i64) -> Result<Vec<Tenant>>;
    fn insert_tenant(&self, tenant: NewTenant) -> Result<Tenant>;
    /// Persist mutable fields (display name, shop name, description).
    fn update_tenant(&self, tenant: &Tenant) -> Result<()>;
    /// Remove the tenant and its products. Returns whether a row existed.
    fn delete_tenant(&self, id: i64) -> Result<bool>;
}

/// Products per tenant. Every listing is ordered by product id.
pub trait CatalogStore: Send + Sync {
    fn products_for_tenant(&self, tenant_id: i64) -> Result<Vec<Product>>;
    fn products_in_catalog(&self, tenant_id: i64, catalog: &str) -> Result<Vec<Product>>;
    fn products_in_subcategory(&self, tenant_id: i64, subcategory: &str) -> Result<Vec<Product>>;
    fn product(&self, id: i64) -> Result<Option<Product>>;
    fn insert_product(&self, product: NewProduct) -> Result<Product>;
    fn update_product(&self, product: &Product) -> Result<()>;
    fn delete_product(&self, id: i64) -> Result<bool>;
}

/// Append-only conversation log.
pub trait ConversationStore: Send + Sync {
    fn append_turn(
        &self,
        chat_id: i64,
        tenant_identifier: &str,
        role: Role,
        content: &str,
    ) -> Result<ConversationTurn>;

    /// At most `limit` turns for the chat, newest first.
    fn recent_turns(
        &self,
        chat_id: i64,
        tenant_identifier: &str,
        limit: usize,
    ) -> Result<Vec<ConversationTurn>>;

    fn conversation_stats(&self, tenant_identifier: &str) -> Result<ConversationStats>;
}

/// Write-once usage records.
pub trait UsageStore: Send + Sync {
    fn record_usage(&self, record: &UsageRecord) -> Result<()>;
    fn usage_for_tenant(&self, tenant_identifier: &str) -> Result<Vec<UsageRecord>>;
}

/// Everything the webhook pipeline reads and writes.
pub trait Store: TenantRegistry + CatalogStore + ConversationStore + UsageStore {}

impl<T: TenantRegistry + CatalogStore + ConversationStore + UsageStore> Store for T {}

pub mod schema;

pub use schema::{
    build_client_with_timeouts, CatalogConfig, Config, ConversationConfig, CostConfig,
    GatewayConfig, ProviderConfig, StorageConfig, TelegramConfig, CONFIG_DIR_ENV,
};

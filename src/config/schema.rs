use anyhow::{Context, Result};
use directories::UserDirs;
use parking_lot::RwLock;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tokio::fs;

static HTTP_CLIENT_CACHE: OnceLock<RwLock<HashMap<String, reqwest::Client>>> = OnceLock::new();

/// Environment variable that relocates the config directory.
pub const CONFIG_DIR_ENV: &str = "SHOPCLAW_CONFIG_DIR";

// ── Top-level config ──────────────────────────────────────────────

/// Top-level ShopClaw configuration, loaded from `config.toml`.
///
/// Resolution order: explicit directory → `SHOPCLAW_CONFIG_DIR` env → `~/.shopclaw/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct Config {
    /// Path to config.toml - computed at load time, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Completion provider (`[provider]`).
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Telegram Bot API access (`[telegram]`).
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// HTTP gateway hosting the webhook (`[gateway]`).
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Conversation memory and failure reply (`[conversation]`).
    #[serde(default)]
    pub conversation: ConversationConfig,

    /// Token pricing (`[cost]`).
    #[serde(default)]
    pub cost: CostConfig,

    /// Catalog presentation (`[catalog]`).
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Persistence (`[storage]`).
    #[serde(default)]
    pub storage: StorageConfig,
}

// ── Provider ──────────────────────────────────────────────────────

/// OpenAI-compatible chat completion endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProviderConfig {
    /// API key. Overridden by `SHOPCLAW_API_KEY` or `OPENAI_API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Base URL, without the `/chat/completions` suffix.
    #[serde(default = "default_provider_api_url")]
    pub api_url: String,
    /// Model identifier sent with every request.
    #[serde(default = "default_provider_model")]
    pub model: String,
    /// Sampling temperature (0.0–2.0). Default: `0.7`.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Whole-request timeout in seconds.
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
    /// Connect timeout in seconds.
    #[serde(default = "default_provider_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Optional cap on completion tokens.
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

fn default_provider_api_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_provider_model() -> String {
    "gpt-3.5-turbo".into()
}

fn default_temperature() -> f64 {
    0.7
}

fn default_provider_timeout_secs() -> u64 {
    60
}

fn default_provider_connect_timeout_secs() -> u64 {
    10
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_provider_api_url(),
            model: default_provider_model(),
            temperature: default_temperature(),
            timeout_secs: default_provider_timeout_secs(),
            connect_timeout_secs: default_provider_connect_timeout_secs(),
            max_tokens: None,
        }
    }
}

// ── Telegram ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TelegramConfig {
    /// Bot API base URL.
    #[serde(default = "default_telegram_api_base")]
    pub api_base: String,
    /// Token used to answer updates addressed to an unknown bot identifier.
    #[serde(default)]
    pub default_bot_token: Option<String>,
    /// Public base URL of this gateway, used when subscribing webhooks.
    #[serde(default)]
    pub webhook_base_url: Option<String>,
    #[serde(default = "default_telegram_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_telegram_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Pause before each product photo sent after an assistant reply.
    #[serde(default = "default_send_delay_ms")]
    pub send_delay_ms: u64,
}

fn default_telegram_api_base() -> String {
    "https://api.telegram.org".into()
}

fn default_telegram_timeout_secs() -> u64 {
    15
}

fn default_telegram_connect_timeout_secs() -> u64 {
    5
}

fn default_send_delay_ms() -> u64 {
    500
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            api_base: default_telegram_api_base(),
            default_bot_token: None,
            webhook_base_url: None,
            timeout_secs: default_telegram_timeout_secs(),
            connect_timeout_secs: default_telegram_connect_timeout_secs(),
            send_delay_ms: default_send_delay_ms(),
        }
    }
}

// ── Gateway ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GatewayConfig {
    /// Gateway port (default: 8080)
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    /// Gateway host (default: 127.0.0.1)
    #[serde(default = "default_gateway_host")]
    pub host: String,
    /// Maximum accepted request body in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Timeout applied to the stats endpoints. The webhook route is exempt.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Bearer token required by the stats endpoints. Open when unset.
    #[serde(default)]
    pub stats_token: Option<String>,
}

fn default_gateway_port() -> u16 {
    8080
}

fn default_gateway_host() -> String {
    "127.0.0.1".into()
}

fn default_max_body_bytes() -> usize {
    65_536
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            host: default_gateway_host(),
            max_body_bytes: default_max_body_bytes(),
            request_timeout_secs: default_request_timeout_secs(),
            stats_token: None,
        }
    }
}

// ── Conversation ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ConversationConfig {
    /// Stored turns replayed to the model per request.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// Reply sent when the completion fails.
    #[serde(default = "default_fallback_reply")]
    pub fallback_reply: String,
}

fn default_history_limit() -> usize {
    30
}

fn default_fallback_reply() -> String {
    "Sorry, an error occurred while processing your request. Please try again later.".into()
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            fallback_reply: default_fallback_reply(),
        }
    }
}

// ── Cost ──────────────────────────────────────────────────────────

/// Per-1K-token prices used when recording usage.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CostConfig {
    #[serde(default = "default_prompt_usd_per_1k")]
    pub prompt_usd_per_1k: f64,
    #[serde(default = "default_completion_usd_per_1k")]
    pub completion_usd_per_1k: f64,
    /// ISO code of the secondary reporting currency.
    #[serde(default = "default_local_currency")]
    pub local_currency: String,
    /// Units of the local currency per USD.
    #[serde(default = "default_usd_exchange_rate")]
    pub usd_exchange_rate: f64,
}

fn default_prompt_usd_per_1k() -> f64 {
    0.0015
}

fn default_completion_usd_per_1k() -> f64 {
    0.002
}

fn default_local_currency() -> String {
    "KZT".into()
}

fn default_usd_exchange_rate() -> f64 {
    540.0
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            prompt_usd_per_1k: default_prompt_usd_per_1k(),
            completion_usd_per_1k: default_completion_usd_per_1k(),
            local_currency: default_local_currency(),
            usd_exchange_rate: default_usd_exchange_rate(),
        }
    }
}

// ── Catalog ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CatalogConfig {
    /// Label printed after prices in captions and grounding text.
    #[serde(default = "default_currency_label")]
    pub currency_label: String,
}

fn default_currency_label() -> String {
    "RUB".into()
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            currency_label: default_currency_label(),
        }
    }
}

// ── Storage ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct StorageConfig {
    /// SQLite database file. Defaults to `shopclaw.db` next to `config.toml`.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

// ── Loading ───────────────────────────────────────────────────────

fn default_config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    let home = UserDirs::new()
        .map(|u| u.home_dir().to_path_buf())
        .context("Could not find home directory")?;
    Ok(home.join(".shopclaw"))
}

impl Config {
    /// Load `config.toml` from `config_dir` (or the default directory),
    /// writing a default file on first run.
    pub async fn load_or_init(config_dir: Option<&Path>) -> Result<Self> {
        let dir = match config_dir {
            Some(dir) => dir.to_path_buf(),
            None => default_config_dir()?,
        };
        let config_path = dir.join("config.toml");

        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let mut config = if config_path.exists() {
            let contents = fs::read_to_string(&config_path)
                .await
                .context("Failed to read config file")?;
            let mut config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            config.config_path = config_path;
            config
        } else {
            let config = Config {
                config_path,
                ..Config::default()
            };
            config.save().await?;
            tracing::info!(path = %config.config_path.display(), "Wrote default config");
            config
        };

        config.apply_env_overrides();
        config.validate()?;
        tracing::info!(path = %config.config_path.display(), "Config loaded");
        Ok(config)
    }

    /// Apply `SHOPCLAW_*` environment overrides on top of file values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) =
            std::env::var("SHOPCLAW_API_KEY").or_else(|_| std::env::var("OPENAI_API_KEY"))
        {
            if !key.is_empty() {
                self.provider.api_key = Some(key);
            }
        }

        if let Ok(model) = std::env::var("SHOPCLAW_MODEL") {
            if !model.is_empty() {
                self.provider.model = model;
            }
        }

        if let Ok(url) = std::env::var("SHOPCLAW_API_URL") {
            if !url.is_empty() {
                self.provider.api_url = url;
            }
        }

        if let Ok(token) = std::env::var("SHOPCLAW_DEFAULT_BOT_TOKEN") {
            if !token.is_empty() {
                self.telegram.default_bot_token = Some(token);
            }
        }

        if let Ok(url) = std::env::var("SHOPCLAW_WEBHOOK_BASE_URL") {
            if !url.is_empty() {
                self.telegram.webhook_base_url = Some(url);
            }
        }

        if let Ok(host) = std::env::var("SHOPCLAW_GATEWAY_HOST") {
            if !host.is_empty() {
                self.gateway.host = host;
            }
        }

        if let Ok(port_str) = std::env::var("SHOPCLAW_GATEWAY_PORT") {
            if let Ok(port) = port_str.parse::<u16>() {
                self.gateway.port = port;
            }
        }

        if let Ok(path) = std::env::var("SHOPCLAW_DB_PATH") {
            if !path.is_empty() {
                self.storage.db_path = Some(PathBuf::from(path));
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            anyhow::bail!(
                "provider.temperature must be between 0.0 and 2.0, got {}",
                self.provider.temperature
            );
        }
        if self.provider.timeout_secs == 0 || self.telegram.timeout_secs == 0 {
            anyhow::bail!("timeouts must be greater than zero");
        }
        if self.conversation.history_limit == 0 {
            anyhow::bail!("conversation.history_limit must be greater than zero");
        }
        if self.cost.usd_exchange_rate < 0.0
            || self.cost.prompt_usd_per_1k < 0.0
            || self.cost.completion_usd_per_1k < 0.0
        {
            anyhow::bail!("cost rates must not be negative");
        }
        Ok(())
    }

    pub async fn save(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;
        let parent_dir = self
            .config_path
            .parent()
            .context("Config path must have a parent directory")?;
        fs::create_dir_all(parent_dir).await.with_context(|| {
            format!(
                "Failed to create config directory: {}",
                parent_dir.display()
            )
        })?;
        fs::write(&self.config_path, toml_str)
            .await
            .with_context(|| format!("Failed to write {}", self.config_path.display()))?;
        Ok(())
    }

    /// Resolved SQLite path.
    pub fn db_path(&self) -> PathBuf {
        match &self.storage.db_path {
            Some(path) => path.clone(),
            None => self
                .config_path
                .parent()
                .map_or_else(|| PathBuf::from("shopclaw.db"), |dir| dir.join("shopclaw.db")),
        }
    }
}

// ── HTTP clients ──────────────────────────────────────────────────

fn http_client_cache() -> &'static RwLock<HashMap<String, reqwest::Client>> {
    HTTP_CLIENT_CACHE.get_or_init(|| RwLock::new(HashMap::new()))
}

fn http_client_cache_key(service_key: &str, timeout_secs: u64, connect_timeout_secs: u64) -> String {
    format!(
        "{}|timeout={timeout_secs}|connect_timeout={connect_timeout_secs}",
        service_key.trim().to_ascii_lowercase()
    )
}

/// Shared `reqwest` client with finite timeouts, cached per service key.
pub fn build_client_with_timeouts(
    service_key: &str,
    timeout_secs: u64,
    connect_timeout_secs: u64,
) -> reqwest::Client {
    let cache_key = http_client_cache_key(service_key, timeout_secs, connect_timeout_secs);
    if let Some(client) = http_client_cache().read().get(&cache_key) {
        return client.clone();
    }

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .connect_timeout(std::time::Duration::from_secs(connect_timeout_secs))
        .build()
        .unwrap_or_else(|error| {
            tracing::warn!(service_key, "Failed to build timeout client: {error}");
            reqwest::Client::new()
        });
    http_client_cache().write().insert(cache_key, client.clone());
    client
}

//! Axum-based HTTP gateway hosting the per-tenant Telegram webhooks.
//!
//! Telegram delivers each bot's updates to
//! `POST /api/telegram/webhook/{bot_identifier}`. The handler always answers
//! 200 so Telegram never retries an update; failures are logged and, where
//! the customer is waiting, answered with the fallback reply. Owners read
//! usage and conversation counters from the `/api/*` stats routes.

pub mod api;

use crate::assistant::{Assistant, AssistantSettings};
use crate::bot::{ResponseRenderer, WebhookDispatcher};
use crate::channels::{ChatPlatform, TelegramClient};
use crate::config::{Config, GatewayConfig};
use crate::cost::{CostRates, UsageTracker};
use crate::providers::{OpenAiProvider, Provider};
use crate::store::{ConversationStore, SqliteStore};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Shared state for all axum handlers
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<WebhookDispatcher>,
    pub usage: Arc<UsageTracker>,
    pub conversations: Arc<dyn ConversationStore>,
    /// Bearer token guarding the stats routes; `None` leaves them open.
    pub stats_token: Option<Arc<str>>,
}

impl AppState {
    /// Wire the webhook pipeline over `store`, `provider` and `platform`.
    pub fn new(
        config: &Config,
        store: Arc<SqliteStore>,
        provider: Arc<dyn Provider>,
        platform: Arc<dyn ChatPlatform>,
    ) -> Self {
        let usage = Arc::new(UsageTracker::new(
            store.clone(),
            CostRates::from(&config.cost),
        ));
        let assistant = Arc::new(Assistant::new(
            store.clone(),
            store.clone(),
            provider,
            usage.clone(),
            AssistantSettings::from(config),
        ));
        let renderer = ResponseRenderer::new(
            platform.clone(),
            store.clone(),
            config.catalog.currency_label.clone(),
            Duration::from_millis(config.telegram.send_delay_ms),
        );
        let dispatcher = Arc::new(WebhookDispatcher::new(
            store.clone(),
            store.clone(),
            platform,
            assistant,
            renderer,
            config.telegram.default_bot_token.clone(),
        ));

        Self {
            dispatcher,
            usage,
            conversations: store,
            stats_token: config
                .gateway
                .stats_token
                .as_deref()
                .map(str::trim)
                .filter(|token| !token.is_empty())
                .map(Arc::from),
        }
    }
}

/// Build the router. The webhook route carries the body limit only; the stats
/// routes are additionally bounded by the request timeout.
pub fn build_router(state: AppState, gateway: &GatewayConfig) -> Router {
    let stats_router = Router::new()
        .route(
            "/api/token-usage/stats/{bot_identifier}",
            get(api::handle_token_usage_stats),
        )
        .route(
            "/api/bots/{bot_identifier}/stats",
            get(api::handle_conversation_stats),
        )
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(gateway.request_timeout_secs),
        ));

    Router::new()
        .route("/health", get(handle_health))
        .route(
            "/api/telegram/webhook/{bot_identifier}",
            post(handle_telegram_webhook),
        )
        .merge(stats_router)
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(gateway.max_body_bytes))
}

/// Run the HTTP gateway using axum with proper HTTP/1.1 compliance.
pub async fn run_gateway(host: &str, port: u16, config: Config) -> Result<()> {
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("Invalid gateway address {host}:{port}"))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_port = listener.local_addr()?.port();
    let display_addr = format!("{host}:{actual_port}");

    let db_path = config.db_path();
    let store = Arc::new(SqliteStore::open(&db_path)?);
    let provider: Arc<dyn Provider> = Arc::new(OpenAiProvider::from_config(&config.provider));
    let platform: Arc<dyn ChatPlatform> = Arc::new(TelegramClient::from_config(&config.telegram));
    let state = AppState::new(&config, store, provider, platform);
    let stats_protected = state.stats_token.is_some();

    tracing::info!(
        db = %db_path.display(),
        model = %config.provider.model,
        "Gateway state ready"
    );

    println!("🛒 ShopClaw Gateway listening on http://{display_addr}");
    if let Some(base) = config.telegram.webhook_base_url.as_deref() {
        println!("  🌐 Webhook base URL: {base}");
    }
    println!("  POST /api/telegram/webhook/{{bot}} — Telegram updates for a registered bot");
    println!("  GET  /api/token-usage/stats/{{bot}} — token usage and cost");
    println!("  GET  /api/bots/{{bot}}/stats        — message and dialogue counts");
    println!("  GET  /health                       — health check");
    if stats_protected {
        println!("  🔒 Stats: bearer token required");
    } else {
        println!("  ⚠️  Stats: open (set [gateway] stats_token to protect them)");
    }
    println!("  Press Ctrl+C to stop.\n");

    let app = build_router(state, &config.gateway);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

// ══════════════════════════════════════════════════════════════════════════════
// AXUM HANDLERS
// ══════════════════════════════════════════════════════════════════════════════

/// GET /health
async fn handle_health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// POST /api/telegram/webhook/{bot_identifier}
async fn handle_telegram_webhook(
    State(state): State<AppState>,
    Path(bot_identifier): Path<String>,
    body: Bytes,
) -> impl IntoResponse {
    let outcome = state.dispatcher.process_raw(&bot_identifier, &body).await;
    tracing::debug!(tenant = %bot_identifier, ?outcome, "Webhook update processed");
    (StatusCode::OK, Json(serde_json::json!({ "ok": true })))
}

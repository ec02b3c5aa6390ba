//! Webhook dispatcher: classifies inbound updates and drives the command
//! handlers or the assistant + renderer.

pub mod commands;
pub mod render;

pub use commands::Command;
pub use render::{matching_products, product_caption, RenderReport, ResponseRenderer};

use crate::assistant::Assistant;
use crate::channels::telegram::TelegramUpdate;
use crate::channels::ChatPlatform;
use crate::store::{CatalogStore, Tenant, TenantRegistry};
use std::sync::Arc;

/// What happened to one inbound update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Not a text message, or not parseable; nothing was sent.
    Ignored,
    /// The identifier in the webhook path names no tenant.
    UnknownTenant,
    Command(Command),
    Conversation {
        fallback: bool,
        photos: usize,
    },
    /// An internal error stopped processing; logged, no reply sent.
    Failed,
}

pub struct WebhookDispatcher {
    registry: Arc<dyn TenantRegistry>,
    catalog: Arc<dyn CatalogStore>,
    platform: Arc<dyn ChatPlatform>,
    assistant: Arc<Assistant>,
    renderer: ResponseRenderer,
    default_bot_token: Option<String>,
}

impl WebhookDispatcher {
    pub fn new(
        registry: Arc<dyn TenantRegistry>,
        catalog: Arc<dyn CatalogStore>,
        platform: Arc<dyn ChatPlatform>,
        assistant: Arc<Assistant>,
        renderer: ResponseRenderer,
        default_bot_token: Option<String>,
    ) -> Self {
        Self {
            registry,
            catalog,
            platform,
            assistant,
            renderer,
            default_bot_token: default_bot_token.filter(|token| !token.trim().is_empty()),
        }
    }

    /// Entry point for raw webhook bodies. Malformed JSON is ignored.
    pub async fn process_raw(&self, tenant_identifier: &str, body: &[u8]) -> DispatchOutcome {
        match serde_json::from_slice::<TelegramUpdate>(body) {
            Ok(update) => self.process_update(tenant_identifier, &update).await,
            Err(e) => {
                tracing::warn!(tenant = tenant_identifier, "Ignoring malformed update: {e}");
                DispatchOutcome::Ignored
            }
        }
    }

    pub async fn process_update(
        &self,
        tenant_identifier: &str,
        update: &TelegramUpdate,
    ) -> DispatchOutcome {
        let Some((chat_id, text)) = update.chat_text() else {
            tracing::debug!(tenant = tenant_identifier, update_id = ?update.update_id, "Ignoring non-text update");
            return DispatchOutcome::Ignored;
        };

        let tenant = match self.registry.find_by_identifier(tenant_identifier) {
            Ok(Some(tenant)) => tenant,
            Ok(None) => {
                self.notify_unknown_tenant(tenant_identifier, chat_id).await;
                return DispatchOutcome::UnknownTenant;
            }
            Err(e) => {
                tracing::error!(tenant = tenant_identifier, "Tenant lookup failed: {e:#}");
                return DispatchOutcome::Failed;
            }
        };

        match Command::parse(text, &tenant.identifier) {
            Some(command) => {
                tracing::info!(tenant = %tenant.identifier, chat_id, command = command.kind(), "Command received");
                if self.handle_command(&tenant, chat_id, &command).await {
                    DispatchOutcome::Command(command)
                } else {
                    DispatchOutcome::Failed
                }
            }
            None => {
                tracing::info!(tenant = %tenant.identifier, chat_id, "Message received");
                let reply = self.assistant.reply(&tenant, chat_id, text).await;
                let report = self.renderer.render(&tenant, chat_id, reply.text()).await;
                DispatchOutcome::Conversation {
                    fallback: reply.is_fallback(),
                    photos: report.photos_delivered,
                }
            }
        }
    }

    async fn notify_unknown_tenant(&self, tenant_identifier: &str, chat_id: i64) {
        tracing::warn!(tenant = tenant_identifier, chat_id, "Update for unregistered bot");
        match &self.default_bot_token {
            Some(token) => {
                self.platform
                    .send_text(token, chat_id, &commands::not_registered())
                    .await;
            }
            None => tracing::warn!("No default bot token configured; not-registered notice skipped"),
        }
    }

    /// Returns `false` when a store read failed and no reply was sent.
    async fn handle_command(&self, tenant: &Tenant, chat_id: i64, command: &Command) -> bool {
        let token = tenant.access_token.as_str();
        match command {
            Command::Start => {
                self.platform
                    .send_text(token, chat_id, &commands::greeting(tenant.shop_label()))
                    .await;
            }
            Command::Catalogs => {
                let Some(products) = self.load(tenant, self.catalog.products_for_tenant(tenant.id))
                else {
                    return false;
                };
                self.platform
                    .send_text(token, chat_id, &commands::catalog_listing(&products))
                    .await;
            }
            Command::Catalog(name) => {
                let Some(products) =
                    self.load(tenant, self.catalog.products_in_catalog(tenant.id, name))
                else {
                    return false;
                };
                self.platform
                    .send_text(token, chat_id, &commands::subcategory_listing(name, &products))
                    .await;
            }
            Command::Subcategory(name) => {
                let Some(products) =
                    self.load(tenant, self.catalog.products_in_subcategory(tenant.id, name))
                else {
                    return false;
                };
                if products.is_empty() {
                    self.platform
                        .send_text(token, chat_id, &commands::no_products(name))
                        .await;
                }
                for product in &products {
                    let caption = product_caption(product, self.renderer.currency_label());
                    match product.image() {
                        Some(url) => self.platform.send_photo(token, chat_id, url, &caption).await,
                        None => self.platform.send_text(token, chat_id, &caption).await,
                    };
                }
            }
            Command::Unknown(_) => {
                self.platform
                    .send_text(token, chat_id, &commands::help())
                    .await;
            }
        }
        true
    }

    fn load<T>(&self, tenant: &Tenant, result: anyhow::Result<T>) -> Option<T> {
        result
            .map_err(|e| {
                tracing::error!(tenant = %tenant.identifier, "Catalog read failed: {e:#}");
            })
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assistant::AssistantSettings;
    use crate::cost::{CostRates, UsageTracker};
    use crate::providers::{ChatMessage, ChatResponse, Provider};
    use crate::store::{ConversationStore, NewProduct, NewTenant, SqliteStore};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Sent {
        Text { token: String, chat_id: i64, text: String },
        Photo { token: String, chat_id: i64, url: String, caption: String },
    }

    #[derive(Default)]
    struct RecordingPlatform {
        sent: Mutex<Vec<Sent>>,
    }

    impl RecordingPlatform {
        fn texts(&self) -> Vec<String> {
            self.sent
                .lock()
                .iter()
                .filter_map(|s| match s {
                    Sent::Text { text, .. } => Some(text.clone()),
                    Sent::Photo { .. } => None,
                })
                .collect()
        }

        fn photos(&self) -> Vec<(String, String)> {
            self.sent
                .lock()
                .iter()
                .filter_map(|s| match s {
                    Sent::Photo { url, caption, .. } => Some((url.clone(), caption.clone())),
                    Sent::Text { .. } => None,
                })
                .collect()
        }
    }

    #[async_trait]
    impl ChatPlatform for RecordingPlatform {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send_text(&self, token: &str, chat_id: i64, text: &str) -> bool {
            self.sent.lock().push(Sent::Text {
                token: token.into(),
                chat_id,
                text: text.into(),
            });
            true
        }

        async fn send_photo(&self, token: &str, chat_id: i64, photo_url: &str, caption: &str) -> bool {
            self.sent.lock().push(Sent::Photo {
                token: token.into(),
                chat_id,
                url: photo_url.into(),
                caption: caption.into(),
            });
            true
        }
    }

    struct FixedProvider(Option<String>);

    #[async_trait]
    impl Provider for FixedProvider {
        async fn chat(
            &self,
            _messages: &[ChatMessage],
            _model: &str,
            _temperature: f64,
        ) -> anyhow::Result<ChatResponse> {
            match &self.0 {
                Some(text) => Ok(ChatResponse {
                    text: text.clone(),
                    usage: None,
                }),
                None => anyhow::bail!("upstream down"),
            }
        }
    }

    struct Harness {
        store: Arc<SqliteStore>,
        platform: Arc<RecordingPlatform>,
        dispatcher: WebhookDispatcher,
        tenant: Tenant,
    }

    fn harness(answer: Option<&str>, default_token: Option<&str>) -> Harness {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let tenant = store
            .insert_tenant(NewTenant {
                display_name: "Shop Bot".into(),
                identifier: "shopbot".into(),
                platform: "telegram".into(),
                access_token: "111:tenant".into(),
                platform_api_id: 111,
                shop_name: Some("Mugs & Co".into()),
                owner_id: 1,
                description: None,
            })
            .unwrap();
        let platform = Arc::new(RecordingPlatform::default());
        let usage = Arc::new(UsageTracker::new(store.clone(), CostRates::default()));
        let assistant = Arc::new(Assistant::new(
            store.clone(),
            store.clone(),
            Arc::new(FixedProvider(answer.map(Into::into))),
            usage,
            AssistantSettings::default(),
        ));
        let renderer = ResponseRenderer::new(platform.clone(), store.clone(), "RUB", Duration::ZERO);
        let dispatcher = WebhookDispatcher::new(
            store.clone(),
            store.clone(),
            platform.clone(),
            assistant,
            renderer,
            default_token.map(Into::into),
        );
        Harness {
            store,
            platform,
            dispatcher,
            tenant,
        }
    }

    fn add_product(h: &Harness, name: &str, catalog: &str, subcategory: &str, image: Option<&str>) {
        h.store
            .insert_product(NewProduct {
                tenant_id: h.tenant.id,
                name: name.into(),
                price: Decimal::from_str("9.99").unwrap(),
                description: Some(format!("{name} description")),
                catalog: catalog.into(),
                subcategory: subcategory.into(),
                image_url: image.map(Into::into),
                in_stock: true,
            })
            .unwrap();
    }

    fn update(chat_id: i64, text: &str) -> TelegramUpdate {
        serde_json::from_value(serde_json::json!({
            "update_id": 1,
            "message": { "chat": { "id": chat_id }, "text": text }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn non_text_updates_are_ignored() {
        let h = harness(Some("hi"), None);
        let outcome = h.dispatcher.process_update("shopbot", &TelegramUpdate::default()).await;
        assert_eq!(outcome, DispatchOutcome::Ignored);
        assert_eq!(
            h.dispatcher.process_raw("shopbot", b"not json").await,
            DispatchOutcome::Ignored
        );
        assert!(h.platform.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn unknown_tenant_gets_notice_with_default_token() {
        let h = harness(Some("hi"), Some("999:default"));
        let outcome = h.dispatcher.process_update("ghost", &update(5, "hello")).await;
        assert_eq!(outcome, DispatchOutcome::UnknownTenant);
        let sent = h.platform.sent.lock();
        assert_eq!(
            sent.as_slice(),
            &[Sent::Text {
                token: "999:default".into(),
                chat_id: 5,
                text: commands::not_registered(),
            }]
        );
    }

    #[tokio::test]
    async fn unknown_tenant_without_default_token_sends_nothing() {
        let h = harness(Some("hi"), Some("  "));
        let outcome = h.dispatcher.process_update("ghost", &update(5, "hello")).await;
        assert_eq!(outcome, DispatchOutcome::UnknownTenant);
        assert!(h.platform.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn start_greets_with_shop_name_using_tenant_token() {
        let h = harness(Some("hi"), None);
        h.dispatcher.process_update("shopbot", &update(5, "/start")).await;
        let sent = h.platform.sent.lock();
        match &sent[0] {
            Sent::Text { token, text, .. } => {
                assert_eq!(token, "111:tenant");
                assert!(text.contains("Mugs & Co"));
            }
            other => panic!("unexpected send: {other:?}"),
        }
    }

    #[tokio::test]
    async fn catalog_subcommand_lists_exact_subcategories() {
        let h = harness(Some("hi"), None);
        add_product(&h, "Phone X", "Electronics", "Phones", None);
        add_product(&h, "Laptop", "Electronics", "Laptops", None);
        add_product(&h, "Phone Y", "Electronics", "Phones", None);
        add_product(&h, "Mug", "Home", "Kitchen", None);

        let outcome = h
            .dispatcher
            .process_update("shopbot", &update(5, "/catalog_Electronics"))
            .await;
        assert_eq!(outcome, DispatchOutcome::Command(Command::Catalog("Electronics".into())));

        let texts = h.platform.texts();
        assert_eq!(texts.len(), 1);
        let lines: Vec<_> = texts[0]
            .lines()
            .filter(|line| line.starts_with("/subcategory_"))
            .collect();
        assert_eq!(lines, vec!["/subcategory_Phones", "/subcategory_Laptops"]);
    }

    #[tokio::test]
    async fn subcategory_sends_photo_or_text_per_product() {
        let h = harness(Some("hi"), None);
        add_product(&h, "Mug", "Home", "Kitchen", Some("http://img/mug.jpg"));
        add_product(&h, "Plate", "Home", "Kitchen", None);

        h.dispatcher
            .process_update("shopbot", &update(5, "/subcategory_Kitchen"))
            .await;

        let photos = h.platform.photos();
        assert_eq!(photos.len(), 1);
        assert_eq!(photos[0].0, "http://img/mug.jpg");
        assert!(photos[0].1.contains("9.99"));
        let texts = h.platform.texts();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].starts_with("📦 Plate"));
    }

    #[tokio::test]
    async fn empty_listings_reply_with_notices() {
        let h = harness(Some("hi"), None);
        h.dispatcher.process_update("shopbot", &update(5, "/catalog")).await;
        h.dispatcher
            .process_update("shopbot", &update(5, "/subcategory_None"))
            .await;
        h.dispatcher.process_update("shopbot", &update(5, "/whatever")).await;
        let texts = h.platform.texts();
        assert!(texts[0].contains("empty"));
        assert!(texts[1].contains("No products"));
        assert!(texts[2].contains("Unknown command"));
    }

    #[tokio::test]
    async fn free_text_runs_assistant_and_renders_photos() {
        let h = harness(Some("Our Mug is perfect for tea"), None);
        add_product(&h, "Mug", "Home", "Kitchen", Some("http://img/mug.jpg"));
        add_product(&h, "Kettle", "Home", "Kitchen", Some("http://img/kettle.jpg"));

        let outcome = h.dispatcher.process_update("shopbot", &update(5, "tea?")).await;
        assert_eq!(
            outcome,
            DispatchOutcome::Conversation {
                fallback: false,
                photos: 1
            }
        );
        assert_eq!(h.platform.texts(), vec!["Our Mug is perfect for tea".to_string()]);
        assert_eq!(h.platform.photos()[0].0, "http://img/mug.jpg");
        assert_eq!(h.store.recent_turns(5, "shopbot", 30).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn failing_completion_sends_fallback_without_turns() {
        let h = harness(None, None);
        let outcome = h.dispatcher.process_update("shopbot", &update(5, "tea?")).await;
        assert_eq!(
            outcome,
            DispatchOutcome::Conversation {
                fallback: true,
                photos: 0
            }
        );
        assert_eq!(
            h.platform.texts(),
            vec![AssistantSettings::default().fallback_reply]
        );
        assert!(h.store.recent_turns(5, "shopbot", 30).unwrap().is_empty());
    }

    #[tokio::test]
    async fn replayed_update_appends_two_more_turns() {
        let h = harness(Some("Sure"), None);
        let same = update(5, "hello");
        h.dispatcher.process_update("shopbot", &same).await;
        h.dispatcher.process_update("shopbot", &same).await;
        let turns = h.store.recent_turns(5, "shopbot", 30).unwrap();
        assert_eq!(turns.len(), 4);
        let contents: Vec<_> = turns.iter().rev().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["hello", "Sure", "hello", "Sure"]);
    }
}

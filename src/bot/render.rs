use crate::channels::ChatPlatform;
use crate::store::{CatalogStore, Product, Tenant};
use std::sync::Arc;
use std::time::Duration;

/// Photo caption for a product: name, price, description.
pub fn product_caption(product: &Product, currency_label: &str) -> String {
    let description = product
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or("No description");
    let mut caption = format!(
        "📦 {}\n💰 {} {currency_label}\n📝 {description}",
        product.name, product.price
    );
    if !product.in_stock {
        caption.push_str("\n⚠️ Out of stock");
    }
    caption
}

/// Products with an image whose name occurs in `text`, case-insensitively.
///
/// Plain substring match: "iPhone" also matches a reply mentioning "iPhone 15".
pub fn matching_products<'a>(text: &str, products: &'a [Product]) -> Vec<&'a Product> {
    let haystack = text.to_lowercase();
    products
        .iter()
        .filter(|product| {
            let name = product.name.trim();
            !name.is_empty() && haystack.contains(&name.to_lowercase())
        })
        .filter(|product| product.image().is_some())
        .collect()
}

/// What a render pass managed to deliver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderReport {
    pub text_delivered: bool,
    pub photos_attempted: usize,
    pub photos_delivered: usize,
}

/// Turns an assistant reply into outbound messages: the text, then one photo
/// per product it mentions.
pub struct ResponseRenderer {
    platform: Arc<dyn ChatPlatform>,
    catalog: Arc<dyn CatalogStore>,
    currency_label: String,
    send_delay: Duration,
}

impl ResponseRenderer {
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        catalog: Arc<dyn CatalogStore>,
        currency_label: impl Into<String>,
        send_delay: Duration,
    ) -> Self {
        Self {
            platform,
            catalog,
            currency_label: currency_label.into(),
            send_delay,
        }
    }

    pub fn currency_label(&self) -> &str {
        &self.currency_label
    }

    pub async fn render(&self, tenant: &Tenant, chat_id: i64, text: &str) -> RenderReport {
        let mut report = RenderReport {
            text_delivered: self
                .platform
                .send_text(&tenant.access_token, chat_id, text)
                .await,
            ..RenderReport::default()
        };

        let products = match self.catalog.products_for_tenant(tenant.id) {
            Ok(products) => products,
            Err(e) => {
                tracing::warn!(
                    platform = self.platform.name(),
                    tenant = %tenant.identifier,
                    "Skipping product photos, catalog unavailable: {e:#}"
                );
                return report;
            }
        };

        for product in matching_products(text, &products) {
            let Some(url) = product.image() else {
                continue;
            };
            if !self.send_delay.is_zero() {
                tokio::time::sleep(self.send_delay).await;
            }
            report.photos_attempted += 1;
            let caption = product_caption(product, &self.currency_label);
            if self
                .platform
                .send_photo(&tenant.access_token, chat_id, url, &caption)
                .await
            {
                report.photos_delivered += 1;
            }
        }

        if report.photos_attempted > 0 {
            tracing::debug!(
                platform = self.platform.name(),
                tenant = %tenant.identifier,
                chat_id,
                attempted = report.photos_attempted,
                delivered = report.photos_delivered,
                "Product photos sent"
            );
        }
        report
    }
}

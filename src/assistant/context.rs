//! Grounding text and message assembly for catalog-constrained answers.

use crate::providers::ChatMessage;
use crate::store::{ConversationTurn, Product, Role};
use std::collections::BTreeMap;
use std::fmt::Write;

/// Label used for products without a catalog or subcategory.
const UNSORTED_LABEL: &str = "Other";

fn group_label(value: &str) -> &str {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        UNSORTED_LABEL
    } else {
        trimmed
    }
}

/// One grounding line per product, grouped catalog → subcategory.
///
/// Image URLs are carried inline as `[IMAGE: <url>]` so the model can quote
/// them instead of inventing links.
pub fn render_catalog(products: &[Product], currency_label: &str) -> String {
    if products.is_empty() {
        return "The catalog is currently empty.\n".to_string();
    }

    let mut grouped: BTreeMap<&str, BTreeMap<&str, Vec<&Product>>> = BTreeMap::new();
    for product in products {
        grouped
            .entry(group_label(&product.catalog))
            .or_default()
            .entry(group_label(&product.subcategory))
            .or_default()
            .push(product);
    }

    let mut out = String::new();
    for (catalog, subcategories) in &grouped {
        let _ = writeln!(out, "Catalog: {catalog}");
        for (subcategory, items) in subcategories {
            let _ = writeln!(out, "  Subcategory: {subcategory}");
            for product in items {
                let _ = write!(out, "    - {} ({} {})", product.name, product.price, currency_label);
                if let Some(description) = product
                    .description
                    .as_deref()
                    .map(str::trim)
                    .filter(|d| !d.is_empty())
                {
                    let _ = write!(out, ": {description}");
                }
                if !product.in_stock {
                    out.push_str(" (out of stock)");
                }
                if let Some(url) = product.image() {
                    let _ = write!(out, " [IMAGE: {url}]");
                }
                out.push('\n');
            }
        }
    }
    out
}

pub fn system_prompt(shop_name: &str, catalog_text: &str) -> String {
    format!(
        "You are the sales assistant of the online shop \"{shop_name}\".\n\
         Answer customer questions using only the product catalog below.\n\
         Rules:\n\
         - Never invent products, prices or links that are not in the catalog.\n\
         - If nothing in the catalog matches the request, say so politely and suggest browsing with /catalog.\n\
         - When recommending a product, always mention its exact name as written in the catalog.\n\
         - Only mention image links exactly as given in [IMAGE: ...] markers.\n\
         - Keep answers short and friendly.\n\n\
         Product catalog:\n{catalog_text}"
    )
}

/// `[system, ...history oldest-first, user]` from newest-first stored turns.
pub fn build_messages(
    system: String,
    history_newest_first: &[ConversationTurn],
    user_text: &str,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history_newest_first.len() + 2);
    messages.push(ChatMessage::system(system));
    messages.extend(history_newest_first.iter().rev().map(|turn| match turn.role {
        Role::User => ChatMessage::user(turn.content.clone()),
        Role::Assistant => ChatMessage::assistant(turn.content.clone()),
    }));
    messages.push(ChatMessage::user(user_text));
    messages
}

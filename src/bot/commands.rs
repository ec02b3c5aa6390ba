//! Slash-command classification and the catalog-browsing replies.

use crate::store::Product;
use std::collections::HashSet;
use std::fmt::Write;

pub const COMMAND_PREFIX: char = '/';
const START: &str = "/start";
const CATALOG: &str = "/catalog";
const CATALOG_PREFIX: &str = "/catalog_";
const SUBCATEGORY_PREFIX: &str = "/subcategory_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/start…` (prefix match)
    Start,
    /// `/catalog` (exact)
    Catalogs,
    /// `/catalog_<name>`
    Catalog(String),
    /// `/subcategory_<name>`
    Subcategory(String),
    Unknown(String),
}

impl Command {
    /// Classify `text`. Returns `None` for free text.
    ///
    /// In group chats Telegram appends `@<botname>` to the command word; the
    /// suffix is dropped when it names `bot_identifier`.
    pub fn parse(text: &str, bot_identifier: &str) -> Option<Self> {
        let text = text.trim();
        if !text.starts_with(COMMAND_PREFIX) {
            return None;
        }
        let normalized = strip_bot_mention(text, bot_identifier);
        let text = normalized.as_str();

        let command = if text.starts_with(START) {
            Self::Start
        } else if text == CATALOG {
            Self::Catalogs
        } else if let Some(name) = non_blank_suffix(text, CATALOG_PREFIX) {
            Self::Catalog(name)
        } else if let Some(name) = non_blank_suffix(text, SUBCATEGORY_PREFIX) {
            Self::Subcategory(name)
        } else {
            Self::Unknown(text.to_string())
        };
        Some(command)
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Catalogs => "catalogs",
            Self::Catalog(_) => "catalog",
            Self::Subcategory(_) => "subcategory",
            Self::Unknown(_) => "unknown",
        }
    }
}

fn non_blank_suffix(text: &str, prefix: &str) -> Option<String> {
    text.strip_prefix(prefix)
        .map(str::trim)
        .filter(|rest| !rest.is_empty())
        .map(ToString::to_string)
}

fn strip_bot_mention(text: &str, bot_identifier: &str) -> String {
    let (head, tail) = match text.find(char::is_whitespace) {
        Some(pos) => text.split_at(pos),
        None => (text, ""),
    };
    match head.rsplit_once('@') {
        Some((command, mention)) if mention.eq_ignore_ascii_case(bot_identifier) => {
            format!("{command}{tail}")
        }
        _ => text.to_string(),
    }
}

/// Distinct non-blank values in first-seen order.
pub fn distinct_non_blank<'a>(values: impl IntoIterator<Item = &'a str>) -> Vec<&'a str> {
    let mut seen = HashSet::new();
    values
        .into_iter()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .filter(|value| seen.insert(*value))
        .collect()
}

// ── Reply texts ──────────────────────────────────────────────────

pub fn greeting(shop_name: &str) -> String {
    format!(
        "👋 Welcome to {shop_name}!\n\n\
         I can help you find products and answer questions about them.\n\
         Use /catalog to browse the catalog, or just tell me what you are looking for."
    )
}

pub fn catalog_listing(products: &[Product]) -> String {
    let catalogs = distinct_non_blank(products.iter().map(|p| p.catalog.as_str()));
    if catalogs.is_empty() {
        return "The catalog is empty for now.".to_string();
    }
    let mut out = String::from("📂 Catalogs:\n\n");
    for catalog in catalogs {
        let _ = writeln!(out, "{CATALOG_PREFIX}{catalog}");
    }
    out
}

pub fn subcategory_listing(catalog: &str, products: &[Product]) -> String {
    let subcategories = distinct_non_blank(products.iter().map(|p| p.subcategory.as_str()));
    if subcategories.is_empty() {
        return format!("No subcategories found in {catalog}.");
    }
    let mut out = format!("📁 {catalog}:\n\n");
    for subcategory in subcategories {
        let _ = writeln!(out, "{SUBCATEGORY_PREFIX}{subcategory}");
    }
    out
}

pub fn no_products(subcategory: &str) -> String {
    format!("No products found in {subcategory}.")
}

pub fn help() -> String {
    "Unknown command. Available commands:\n\
     /start - welcome message\n\
     /catalog - browse the catalog\n\n\
     You can also just ask me about our products."
        .to_string()
}

pub fn not_registered() -> String {
    "This bot is not registered in the shop system.".to_string()
}

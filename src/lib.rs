#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::field_reassign_with_default,
    clippy::float_cmp,
    clippy::items_after_statements,
    clippy::map_unwrap_or,
    clippy::manual_let_else,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::needless_pass_by_value,
    clippy::redundant_closure_for_method_calls,
    clippy::return_self_not_must_use,
    clippy::similar_names,
    clippy::single_match_else,
    clippy::struct_field_names,
    clippy::too_many_lines,
    clippy::uninlined_format_args,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss,
    clippy::unnecessary_wraps
)]

use clap::Subcommand;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub mod assistant;
pub mod bot;
pub mod channels;
pub mod config;
pub mod cost;
pub mod gateway;
pub mod providers;
pub mod registry;
pub mod store;
pub(crate) mod util;

pub use config::Config;

/// Bot (tenant) administration subcommands
#[derive(Subcommand, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum BotCommands {
    /// Register a Telegram bot for an owner
    #[command(long_about = "\
Register a Telegram bot for an owner.

The access token is checked with getMe and must belong to the bot \
named by --identifier. When [telegram] webhook_base_url is set, the \
bot's webhook is pointed at this gateway.

Examples:
  shopclaw bot register --owner 42 --name 'Mug Shop' --identifier mugshop_bot --token 123:ABC
  shopclaw bot register --owner 42 --name Phones --identifier @phones_bot --token 456:DEF --shop-name 'Phone Corner'")]
    Register {
        /// Owner's Telegram user id
        #[arg(long)]
        owner: i64,
        /// Display name
        #[arg(long)]
        name: String,
        /// Bot username, with or without '@'
        #[arg(long)]
        identifier: String,
        /// Bot API access token
        #[arg(long)]
        token: String,
        /// Shop name shown to customers
        #[arg(long)]
        shop_name: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// List an owner's bots
    List {
        #[arg(long)]
        owner: i64,
    },
    /// Change a bot's descriptive fields
    Update {
        /// Bot id (see `bot list`)
        id: i64,
        #[arg(long)]
        owner: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        shop_name: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Set the shop name shown in greetings and prompts
    ShopName {
        id: i64,
        shop_name: String,
        #[arg(long)]
        owner: i64,
    },
    /// Unsubscribe the webhook and delete the bot with its products
    Remove {
        id: i64,
        #[arg(long)]
        owner: i64,
    },
}

/// Catalog administration subcommands
#[derive(Subcommand, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ProductCommands {
    /// Add a product to a bot's catalog
    #[command(long_about = "\
Add a product to a bot's catalog.

Prices are exact decimals and must be at least 0.01.

Examples:
  shopclaw product add --owner 42 --bot 1 --name Mug --price 9.99 --catalog Home --subcategory Kitchen
  shopclaw product add --owner 42 --bot 1 --name 'iPhone 15' --price 999 \\
      --catalog Electronics --subcategory Phones --image-url https://cdn.example.com/15.jpg")]
    Add {
        #[arg(long)]
        owner: i64,
        /// Bot id (see `bot list`)
        #[arg(long)]
        bot: i64,
        #[arg(long)]
        name: String,
        #[arg(long)]
        price: Decimal,
        #[arg(long)]
        catalog: String,
        #[arg(long)]
        subcategory: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        image_url: Option<String>,
        /// Mark the product as out of stock
        #[arg(long)]
        out_of_stock: bool,
    },
    /// List a bot's products
    List {
        #[arg(long)]
        owner: i64,
        #[arg(long)]
        bot: i64,
    },
    /// Delete a product
    Remove {
        id: i64,
        #[arg(long)]
        owner: i64,
    },
}

/// Config subcommands
#[derive(Subcommand, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum ConfigCommands {
    /// Dump the full configuration JSON Schema to stdout
    Schema,
}

#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::needless_pass_by_value,
    clippy::too_many_lines,
    clippy::uninlined_format_args
)]

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use shopclaw::channels::TelegramClient;
use shopclaw::cost::{CostRates, UsageTracker};
use shopclaw::registry::{NewTenantRequest, ProductDraft, ProductService, TenantPatch, TenantService};
use shopclaw::store::{ConversationStore, SqliteStore};
use shopclaw::{gateway, BotCommands, Config, ConfigCommands, ProductCommands};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// `ShopClaw` - catalog-aware Telegram shop bots for many owners.
#[derive(Parser, Debug)]
#[command(name = "shopclaw")]
#[command(version)]
#[command(about = "Multi-tenant Telegram shop bots answering from their own catalog.", long_about = None)]
struct Cli {
    /// Directory holding config.toml (defaults to $SHOPCLAW_CONFIG_DIR, then ~/.shopclaw)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the webhook gateway
    #[command(long_about = "\
Start the HTTP gateway that receives Telegram webhooks for every \
registered bot.

Examples:
  shopclaw gateway                  # use config defaults
  shopclaw gateway -p 9090          # listen on port 9090
  shopclaw gateway --host 0.0.0.0   # all interfaces (behind a reverse proxy)")]
    Gateway {
        /// Port to listen on (use 0 for random available port); defaults to config gateway.port
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to; defaults to config gateway.host
        #[arg(long)]
        host: Option<String>,
    },

    /// Manage registered bots
    Bot {
        #[command(subcommand)]
        bot_command: BotCommands,
    },

    /// Manage bot catalogs
    Product {
        #[command(subcommand)]
        product_command: ProductCommands,
    },

    /// Show token usage, cost and conversation counts for a bot
    Usage {
        /// Bot identifier (Telegram username)
        identifier: String,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        config_command: ConfigCommands,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(dir) = &cli.config_dir {
        if dir.as_os_str().is_empty() {
            bail!("--config-dir cannot be empty");
        }
    }

    // Schema output must stay stdout-only.
    if let Commands::Config {
        config_command: ConfigCommands::Schema,
    } = &cli.command
    {
        let schema = schemars::schema_for!(Config);
        println!(
            "{}",
            serde_json::to_string_pretty(&schema).context("Failed to serialize JSON Schema")?
        );
        return Ok(());
    }

    // Initialize logging - respects RUST_LOG env var, defaults to INFO
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install tracing subscriber")?;

    let config = Config::load_or_init(cli.config_dir.as_deref()).await?;

    match cli.command {
        Commands::Config { .. } => Ok(()),

        Commands::Gateway { port, host } => {
            let port = port.unwrap_or(config.gateway.port);
            let host = host.unwrap_or_else(|| config.gateway.host.clone());
            if port == 0 {
                info!("🚀 Starting ShopClaw Gateway on {host} (random port)");
            } else {
                info!("🚀 Starting ShopClaw Gateway on {host}:{port}");
            }
            gateway::run_gateway(&host, port, config).await
        }

        Commands::Bot { bot_command } => handle_bot_command(bot_command, &config).await,

        Commands::Product { product_command } => {
            handle_product_command(product_command, &config).await
        }

        Commands::Usage { identifier } => {
            let store = open_store(&config)?;
            let tracker = UsageTracker::new(store.clone(), CostRates::from(&config.cost));
            let usage = tracker.stats(&identifier)?;
            let conversations = store.conversation_stats(&identifier)?;

            println!("📊 Usage for @{identifier}");
            println!();
            println!("Requests:           {}", usage.total_requests);
            println!("Prompt tokens:      {}", usage.total_prompt_tokens);
            println!("Completion tokens:  {}", usage.total_completion_tokens);
            println!("Cost (USD):         ${:.4}", usage.total_cost_usd);
            println!(
                "Cost ({}):         {:.2}",
                config.cost.local_currency, usage.total_cost_local
            );
            println!();
            println!("Messages:           {}", conversations.total_messages);
            println!("Dialogues:          {}", conversations.total_dialogues);
            Ok(())
        }
    }
}

fn open_store(config: &Config) -> Result<Arc<SqliteStore>> {
    Ok(Arc::new(SqliteStore::open(&config.db_path())?))
}

async fn handle_bot_command(command: BotCommands, config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let service = TenantService::new(
        store,
        Arc::new(TelegramClient::from_config(&config.telegram)),
        config.telegram.webhook_base_url.clone(),
    );

    match command {
        BotCommands::Register {
            owner,
            name,
            identifier,
            token,
            shop_name,
            description,
        } => {
            let tenant = service
                .register(
                    owner,
                    NewTenantRequest {
                        display_name: name,
                        identifier,
                        access_token: token,
                        shop_name,
                        description,
                    },
                )
                .await?;
            println!(
                "✅ Registered @{} (id {}) for owner {}",
                tenant.identifier, tenant.id, tenant.owner_id
            );
            Ok(())
        }
        BotCommands::List { owner } => {
            let tenants = service.list(owner)?;
            if tenants.is_empty() {
                println!("No bots registered for owner {owner}.");
                return Ok(());
            }
            println!("Bots ({}):", tenants.len());
            for tenant in tenants {
                println!(
                    "  {:>4}  @{}  {}",
                    tenant.id,
                    tenant.identifier,
                    tenant.shop_label()
                );
            }
            Ok(())
        }
        BotCommands::Update {
            id,
            owner,
            name,
            shop_name,
            description,
        } => {
            let tenant = service.update(
                id,
                owner,
                TenantPatch {
                    display_name: name,
                    shop_name,
                    description,
                },
            )?;
            println!("✅ Updated @{}", tenant.identifier);
            Ok(())
        }
        BotCommands::ShopName {
            id,
            shop_name,
            owner,
        } => {
            let tenant = service.set_shop_name(id, owner, &shop_name)?;
            println!("✅ @{} now presents as '{}'", tenant.identifier, tenant.shop_label());
            Ok(())
        }
        BotCommands::Remove { id, owner } => {
            service.delete(id, owner).await?;
            println!("✅ Bot {id} removed");
            Ok(())
        }
    }
}

async fn handle_product_command(command: ProductCommands, config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let service = ProductService::new(store.clone(), store);
    let currency = &config.catalog.currency_label;

    match command {
        ProductCommands::Add {
            owner,
            bot,
            name,
            price,
            catalog,
            subcategory,
            description,
            image_url,
            out_of_stock,
        } => {
            let product = service.create(
                owner,
                bot,
                ProductDraft {
                    name,
                    price,
                    description,
                    catalog,
                    subcategory,
                    image_url,
                    in_stock: !out_of_stock,
                },
            )?;
            println!(
                "✅ Added '{}' ({} {currency}) as product {}",
                product.name, product.price, product.id
            );
            Ok(())
        }
        ProductCommands::List { owner, bot } => {
            let products = service.list(owner, bot)?;
            if products.is_empty() {
                println!("No products.");
                return Ok(());
            }
            for product in products {
                println!(
                    "  {:>4}  {} / {}  {}  {} {currency}{}",
                    product.id,
                    product.catalog,
                    product.subcategory,
                    product.name,
                    product.price,
                    if product.in_stock { "" } else { "  (out of stock)" }
                );
            }
            Ok(())
        }
        ProductCommands::Remove { id, owner } => {
            service.delete(owner, id).await?;
            println!("✅ Product {id} removed");
            Ok(())
        }
    }
}

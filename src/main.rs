use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;

use delivery_menu::models::{CatalogItem, NewCatalogItem};
use delivery_menu::settings::{default_settings_path, Settings};
use delivery_menu::MenuApp;

/// Operate the local menu cache and its remote catalog.
#[derive(Parser)]
#[command(name = "delivery-menu", version, about)]
struct Cli {
    /// Settings file (default: app data directory).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the menu from the local cache.
    List {
        #[arg(long)]
        json: bool,
    },
    /// Add a menu item.
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        price: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "")]
        image: String,
    },
    /// Change fields of an existing item.
    Update {
        id: i64,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        price: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        image: Option<String>,
    },
    /// Delete an item by local id.
    Delete { id: i64 },
    /// Pull the remote catalog into the local cache.
    Refresh,
    /// Show sync status.
    Status,
}

fn parse_price(raw: &str) -> anyhow::Result<Decimal> {
    let price = Decimal::from_str(raw).with_context(|| format!("invalid price: {}", raw))?;
    if price.is_sign_negative() && !price.is_zero() {
        bail!("price must be non-negative");
    }
    Ok(price)
}

fn print_items(items: &[CatalogItem]) {
    for item in items {
        let remote = if item.remote_id.is_empty() {
            "-"
        } else {
            item.remote_id.as_str()
        };
        println!(
            "{:>4}  {:<28} {:>8}  {}",
            item.local_id, item.name, item.price, remote
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    delivery_menu::init_tracing();
    tracing::info!("Starting delivery-menu v{}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    let settings_path = cli.settings.unwrap_or_else(default_settings_path);
    let settings = Settings::load(&settings_path);

    let app = MenuApp::open(settings).context("failed to open menu store")?;

    match cli.command {
        Command::List { json } => {
            let items = app.store.list()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&items)?);
            } else {
                print_items(&items);
            }
        }
        Command::Add {
            name,
            price,
            description,
            image,
        } => {
            let item = NewCatalogItem::new(name, parse_price(&price)?)
                .with_description(description)
                .with_image(image);
            let created = app.sync.create_item(item).await?;
            println!("Added #{} ({})", created.local_id, created.remote_id);
        }
        Command::Update {
            id,
            name,
            price,
            description,
            image,
        } => {
            let Some(mut item) = app.store.get(id)? else {
                bail!("no menu item with id {}", id);
            };
            if let Some(name) = name {
                item.name = name;
            }
            if let Some(price) = price {
                item.price = parse_price(&price)?;
            }
            if let Some(description) = description {
                item.description = description;
            }
            if let Some(image) = image {
                item.image_name = image;
            }
            app.sync.update_item(&item).await?;
            println!("Updated #{}", id);
        }
        Command::Delete { id } => {
            let remote_id = app
                .store
                .get(id)?
                .map(|item| item.remote_id)
                .unwrap_or_default();
            app.sync.delete_item(id, &remote_id).await?;
            println!("Deleted #{}", id);
        }
        Command::Refresh => {
            let outcome = app.sync.refresh().await?;
            println!("{}", serde_json::to_string(&outcome)?);
            print_items(&app.store.list()?);
        }
        Command::Status => {
            println!("{}", serde_json::to_string_pretty(&app.sync.status())?);
        }
    }

    // Let queued remote writes finish before the runtime shuts down.
    app.sync.flush().await;
    Ok(())
}

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::info;

use project_bom::{
    config::{self, AppConfig},
    migrator,
    services::{
        importer::{BomExplorer, ExplodedBom},
        remote::RemotePeerExplorer,
    },
};

#[derive(Parser)]
#[command(name = "project-bom", about = "Operator tooling for project BOMs", version)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON when available"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the project BOM tables
    Migrate(MigrateArgs),
    /// Check the remote peer settings by exploring one product
    CheckRemote(CheckRemoteArgs),
}

#[derive(Args)]
struct MigrateArgs {
    #[arg(long, help = "Database URL; defaults to the configured one")]
    database_url: Option<String>,
}

#[derive(Args)]
struct CheckRemoteArgs {
    #[arg(long, help = "Internal reference of the product to explore")]
    code: String,
    #[arg(long, default_value = "1", help = "Batch quantity passed to the explosion")]
    bulk: Decimal,
}

#[derive(Serialize)]
struct RemoteCheck {
    enabled: bool,
    products: Vec<i64>,
    exploded: Vec<(i64, ExplodedBom)>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config().context("failed to load configuration")?;
    config::init_tracing(&cfg.log_level, cfg.log_json);

    match cli.command {
        Commands::Migrate(args) => handle_migrate(&cfg, args).await?,
        Commands::CheckRemote(args) => handle_check_remote(&cfg, args, cli.json).await?,
    }

    Ok(())
}

async fn handle_migrate(cfg: &AppConfig, args: MigrateArgs) -> Result<()> {
    let url = args.database_url.as_deref().unwrap_or(&cfg.database_url);
    migrator::run_migration(url)
        .await
        .context("failed to run migrations")?;
    println!("Migrations applied");
    Ok(())
}

async fn handle_check_remote(cfg: &AppConfig, args: CheckRemoteArgs, json: bool) -> Result<()> {
    let Some(explorer) = RemotePeerExplorer::from_config(&cfg.remote)? else {
        let check = RemoteCheck {
            enabled: false,
            products: Vec::new(),
            exploded: Vec::new(),
        };
        if json {
            print_json(&check)?;
        } else {
            println!("Remote import disabled: peer settings are incomplete");
        }
        return Ok(());
    };

    let products = explorer
        .resolve_products(&args.code)
        .await
        .with_context(|| format!("failed to resolve {} on the peer", args.code))?;
    info!(count = products.len(), "peer products resolved");

    let mut exploded = Vec::with_capacity(products.len());
    for &product_id in &products {
        let bom = explorer
            .explore(product_id, args.bulk)
            .await
            .with_context(|| format!("failed to explore product {}", product_id))?;
        exploded.push((product_id, bom));
    }

    let check = RemoteCheck {
        enabled: true,
        products,
        exploded,
    };
    if json {
        print_json(&check)?;
    } else {
        render_check(&check);
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn render_check(check: &RemoteCheck) {
    if check.products.is_empty() {
        println!("No peer product matches this reference");
        return;
    }
    for (product_id, bom) in &check.exploded {
        println!("Product {}", product_id);
        for (label, components) in bom {
            println!("  BOM {}", label);
            for (code, component) in components {
                println!(
                    "  - {} x {} ({})",
                    code,
                    component.product_qty,
                    component.operation.as_deref().unwrap_or("no operation")
                );
            }
        }
    }
}

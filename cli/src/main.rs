mod commands;
mod config;
mod fetch;
mod server;
mod sheets;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    cmd_cache_clear, cmd_cache_list, cmd_ingredient_add, cmd_ingredient_delete,
    cmd_ingredient_edit, cmd_list, cmd_new, cmd_notes, cmd_reading, cmd_show, cmd_toggle,
};
use crate::config::Config;
use crate::fetch::HttpFetcher;
use crate::sheets::SheetsClient;
use brewlog_core::cache::CacheStore;
use brewlog_core::router::{CacheRouter, RouterConfig};
use brewlog_core::service::BrewService;

#[derive(Parser)]
#[command(
    name = "brewlog",
    version,
    about = "Track home-brew fermentation batches in a shared spreadsheet"
)]
struct Cli {
    /// Published CSV export of the brew sheet
    #[arg(long, global = true)]
    csv_url: Option<String>,
    /// Script endpoint that saves brew rows
    #[arg(long, global = true)]
    script_url: Option<String>,
    /// Show debug logs on stderr (`RUST_LOG` takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all brews with their status
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a brew's stats, readings, notes and ingredients
    Show {
        /// Brew ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start a new brew
    New {
        /// Brew name
        name: String,
        /// Initial notes
        #[arg(short, long)]
        notes: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Log a gravity reading
    Reading {
        /// Brew ID
        id: String,
        /// Specific gravity (1.046 or 1046)
        sg: String,
        /// Temperature
        #[arg(short, long)]
        temp: Option<f64>,
        /// Reading date (YYYY-MM-DD, DD/MM/YY or today/yesterday; default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replace a brew's notes
    Notes {
        /// Brew ID
        id: String,
        /// New notes (empty clears them)
        text: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage a brew's ingredient list
    Ingredient {
        #[command(subcommand)]
        command: IngredientCommands,
    },
    /// Mark a brew as complete, or back to fermenting
    Toggle {
        /// Brew ID
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run the offline caching gateway
    Serve {
        /// Origin the app shell is served from (e.g. <https://user.github.io>)
        #[arg(long)]
        origin: String,
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
    },
    /// Inspect or clear the response cache
    Cache {
        #[command(subcommand)]
        command: CacheCommands,
    },
}

#[derive(Subcommand)]
enum IngredientCommands {
    /// Add an ingredient
    Add {
        /// Brew ID
        id: String,
        /// Ingredient name
        item: String,
        /// Cost (blank or unparseable counts as 0)
        #[arg(short, long)]
        cost: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Replace the ingredient at a position (1-based)
    Edit {
        /// Brew ID
        id: String,
        /// Position as shown by `brewlog show`
        position: usize,
        /// Ingredient name
        item: String,
        /// Cost (blank or unparseable counts as 0)
        #[arg(short, long)]
        cost: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove the ingredient at a position (1-based)
    Delete {
        /// Brew ID
        id: String,
        /// Position as shown by `brewlog show`
        position: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum CacheCommands {
    /// Show cached responses per cache namespace
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete every cached response
    Clear {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_env("RUST_LOG")
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.csv_url, cli.script_url)?;
    tracing::debug!(data_dir = %config.data_dir.display(), "config loaded");

    match cli.command {
        Commands::Serve { origin, port, bind } => {
            let store = CacheStore::open(&config.cache_db_path)?;
            let router = CacheRouter::new(HttpFetcher::new()?, store, RouterConfig::new(&origin));
            server::start_server(router, port, &bind).await
        }
        Commands::Cache { command } => {
            let store = CacheStore::open(&config.cache_db_path)?;
            match command {
                CacheCommands::List { json } => cmd_cache_list(&store, json),
                CacheCommands::Clear { json } => cmd_cache_clear(&store, json),
            }
        }
        command => {
            let store = CacheStore::open(&config.cache_db_path)?;
            let router =
                CacheRouter::new(HttpFetcher::new()?, store, RouterConfig::without_shell());
            let client = SheetsClient::new(router, &config.csv_url, &config.script_url);
            let mut service = BrewService::new(client);
            if loads_sheet_first(&command) {
                service.refresh().await?;
            }
            run_brew_command(&mut service, command).await
        }
    }
}

/// Starting a brew needs nothing from the current sheet, so it still works
/// when the sheet cannot be read.
fn loads_sheet_first(command: &Commands) -> bool {
    !matches!(command, Commands::New { .. })
}

async fn run_brew_command(
    service: &mut BrewService<SheetsClient>,
    command: Commands,
) -> Result<()> {
    match command {
        Commands::List { json } => cmd_list(service, json),
        Commands::Show { id, json } => cmd_show(service, &id, json),
        Commands::New { name, notes, json } => {
            cmd_new(service, &name, notes.as_deref(), json).await
        }
        Commands::Reading {
            id,
            sg,
            temp,
            date,
            json,
        } => cmd_reading(service, &id, &sg, temp, date, json).await,
        Commands::Notes { id, text, json } => cmd_notes(service, &id, &text, json).await,
        Commands::Toggle { id, json } => cmd_toggle(service, &id, json).await,
        Commands::Ingredient { command } => match command {
            IngredientCommands::Add {
                id,
                item,
                cost,
                json,
            } => cmd_ingredient_add(service, &id, &item, cost.as_deref(), json).await,
            IngredientCommands::Edit {
                id,
                position,
                item,
                cost,
                json,
            } => {
                cmd_ingredient_edit(service, &id, position, &item, cost.as_deref(), json).await
            }
            IngredientCommands::Delete { id, position, json } => {
                cmd_ingredient_delete(service, &id, position, json).await
            }
        },
        Commands::Serve { .. } | Commands::Cache { .. } => Ok(()),
    }
}

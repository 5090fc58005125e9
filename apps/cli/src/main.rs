//! tbc-offers CLI - Manage hidden offers and categories from a terminal
//!
//! Works on the same storage layout the browser tool syncs, kept in two
//! JSON files (synchronized area and device-local area) under the data dir.
//!
//! Usage:
//!   tbc-offers status               - Counts and settings
//!   tbc-offers offers list          - List hidden offers
//!   tbc-offers offers toggle <URL>  - Hide or unhide an offer
//!   tbc-offers export               - Write an export file
//!   tbc-offers import <FILE>        - Merge an export file

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use colored::Colorize;
use dialoguer::Confirm;
use std::path::{Path, PathBuf};
use tbc_offers_core::{
    config::default_config_path, normalize_offer_url, transfer::export_file_name, Config,
    OfferCard, Preferences, StoreError,
};

/// tbc-offers - Hide offers and categories, synced across devices
#[derive(Parser)]
#[command(name = "tbc-offers")]
#[command(about = "Manage hidden bank offers and categories", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (default: ~/.config/tbc-offers/tbc-offers.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the data directory from the config
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show hidden counts and settings
    Status,

    /// Manage hidden offers
    #[command(subcommand)]
    Offers(OffersCommand),

    /// Manage hidden categories
    #[command(subcommand)]
    Categories(CategoriesCommand),

    /// Show or change the auto-load button setting
    Autoload {
        /// New value: on/off, true/false (omit to show the current one)
        #[arg(value_parser = clap::builder::BoolishValueParser::new())]
        show: Option<bool>,
    },

    /// Decide whether an offer card would be hidden
    Check {
        /// Offer link as found on the page
        url: String,

        /// Category shown on the card (repeatable)
        #[arg(short, long = "category")]
        categories: Vec<String>,

        /// Card carries the "Ended" badge
        #[arg(long)]
        ended: bool,
    },

    /// Export hidden offers and categories to a JSON file
    Export {
        /// Output file (default: tbc-hidden-offers-<millis>.json)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Merge hidden offers and categories from an export file
    Import {
        /// Export file to read
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum OffersCommand {
    /// List hidden offers
    List,
    /// Hide an offer (link or identifier)
    Hide { url: String },
    /// Unhide an offer
    Unhide { url: String },
    /// Flip an offer's hidden state
    Toggle { url: String },
    /// Unhide every offer
    Clear {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum CategoriesCommand {
    /// List hidden categories
    List,
    /// Hide a category
    Hide { name: String },
    /// Unhide a category
    Unhide { name: String },
    /// Unhide every category
    Clear {
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("tbc_offers_cli={}", log_level).parse()?)
                .add_directive(format!("tbc_offers_core={}", log_level).parse()?),
        )
        .with_target(false)
        .init();

    let config = load_config(cli.config.as_deref(), cli.data_dir)?;
    let prefs = Preferences::from_config(&config)
        .with_context(|| format!("Cannot open data dir {}", config.data_dir.display()))?;

    let result = match cli.command {
        Commands::Status => cmd_status(&prefs, &config).await,
        Commands::Offers(cmd) => cmd_offers(&prefs, cmd).await,
        Commands::Categories(cmd) => cmd_categories(&prefs, cmd).await,
        Commands::Autoload { show } => cmd_autoload(&prefs, show).await,
        Commands::Check {
            url,
            categories,
            ended,
        } => cmd_check(&prefs, &url, categories, ended).await,
        Commands::Export { output } => cmd_export(&prefs, output).await,
        Commands::Import { file } => cmd_import(&prefs, &file).await,
    };

    if let Err(e) = &result {
        if e.downcast_ref::<StoreError>().is_some_and(StoreError::is_transient) {
            eprintln!(
                "{}",
                "Storage is busy or unavailable, try again in a moment".yellow()
            );
        }
    }
    result
}

fn load_config(path: Option<&Path>, data_dir: Option<PathBuf>) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::load(path)?,
        None => ensure_config()?,
    };
    if let Some(data_dir) = data_dir {
        config.data_dir = data_dir;
    }
    Ok(config)
}

/// Load the default config, writing one with default values on first run.
fn ensure_config() -> Result<Config> {
    let config = Config::load_default()
        .with_context(|| format!("Cannot load {}", default_config_path().display()))?;
    if !default_config_path().exists() {
        let path = config.save_default()?;
        tracing::info!("Created default config at {}", path.display());
    }
    Ok(config)
}

fn offer_id(url: &str) -> Result<String> {
    normalize_offer_url(url.trim()).context("Offer link is empty")
}

fn confirm(prompt: &str, yes: bool) -> Result<bool> {
    if yes {
        return Ok(true);
    }
    Ok(Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()?)
}

// ============ STATUS COMMAND ============

async fn cmd_status(prefs: &Preferences, config: &Config) -> Result<()> {
    println!("{}", "TBC Offers".bold().cyan());
    println!();

    let offers = prefs.hidden_offer_count().await?;
    let categories = prefs.hidden_categories().await?;
    let autoload = prefs.show_autoload_button().await?;

    println!("Data dir:          {}", config.data_dir.display().to_string().dimmed());
    println!("Hidden offers:     {}", offers.to_string().green());
    println!("Hidden categories: {}", categories.len().to_string().green());
    println!(
        "Auto-load button:  {}",
        if autoload { "shown".green() } else { "hidden".yellow() }
    );

    Ok(())
}

// ============ OFFERS COMMANDS ============

async fn cmd_offers(prefs: &Preferences, cmd: OffersCommand) -> Result<()> {
    match cmd {
        OffersCommand::List => {
            let offers = prefs.hidden_offers().await?;
            if offers.is_empty() {
                println!("{}", "No hidden offers yet".dimmed());
            }
            for offer in &offers {
                println!("{}", offer);
            }
        }
        OffersCommand::Hide { url } => {
            let id = offer_id(&url)?;
            if prefs.hide_offer(&id).await? {
                println!("{} {}", "✓ Hidden".green(), id);
            } else {
                println!("{} {}", "Already hidden:".dimmed(), id);
            }
        }
        OffersCommand::Unhide { url } => {
            let id = offer_id(&url)?;
            if prefs.remove_offer(&id).await? {
                println!("{}", "✓ Offer removed successfully".green());
            } else {
                println!("{} {}", "Not hidden:".yellow(), id);
            }
        }
        OffersCommand::Toggle { url } => {
            let id = offer_id(&url)?;
            if prefs.toggle_offer(&id).await? {
                println!("{} {}", "✓ Hidden".green(), id);
            } else {
                println!("{} {}", "✓ Visible".green(), id);
            }
        }
        OffersCommand::Clear { yes } => {
            if !confirm(
                "Are you sure you want to clear all hidden offers? This action cannot be undone.",
                yes,
            )? {
                return Ok(());
            }
            prefs.clear_offers().await?;
            println!("{}", "✓ All hidden offers cleared".green());
        }
    }
    Ok(())
}

// ============ CATEGORIES COMMANDS ============

async fn cmd_categories(prefs: &Preferences, cmd: CategoriesCommand) -> Result<()> {
    match cmd {
        CategoriesCommand::List => {
            let categories = prefs.hidden_categories().await?;
            if categories.is_empty() {
                println!("{}", "No hidden categories yet".dimmed());
            }
            for category in &categories {
                println!("{}", category);
            }
        }
        CategoriesCommand::Hide { name } => {
            if prefs.hide_category(&name).await? {
                println!("{} {}", "✓ Hidden category".green(), name);
            } else {
                println!("{} {}", "Already hidden:".dimmed(), name);
            }
        }
        CategoriesCommand::Unhide { name } => {
            if prefs.remove_category(&name).await? {
                println!("{}", "✓ Category removed successfully".green());
            } else {
                println!("{} {}", "Not hidden:".yellow(), name);
            }
        }
        CategoriesCommand::Clear { yes } => {
            if !confirm(
                "Are you sure you want to clear all hidden categories? This action cannot be undone.",
                yes,
            )? {
                return Ok(());
            }
            prefs.clear_categories().await?;
            println!("{}", "✓ All hidden categories cleared".green());
        }
    }
    Ok(())
}

// ============ SETTINGS / CHECK ============

async fn cmd_autoload(prefs: &Preferences, show: Option<bool>) -> Result<()> {
    match show {
        Some(show) => {
            prefs.set_show_autoload_button(show).await?;
            let state = if show { "enabled" } else { "disabled" };
            println!("{}", format!("✓ Auto-Load button {}", state).green());
        }
        None => {
            let show = prefs.show_autoload_button().await?;
            println!("{}", show);
        }
    }
    Ok(())
}

async fn cmd_check(
    prefs: &Preferences,
    url: &str,
    categories: Vec<String>,
    ended: bool,
) -> Result<()> {
    let card = OfferCard::from_link(url.trim(), categories, ended).context("Offer link is empty")?;
    let rules = prefs.visibility_rules().await?;
    let visibility = rules.evaluate(&card);

    println!("Offer: {}", card.id.cyan());
    match &visibility.reason {
        Some(reason) => println!("{} ({:?})", "Hidden".yellow(), reason),
        None => println!("{}", "Visible".green()),
    }
    println!(
        "Toggle icon: {}",
        if visibility.icon_hidden { "hidden" } else { "visible" }
    );
    Ok(())
}

// ============ EXPORT / IMPORT ============

async fn cmd_export(prefs: &Preferences, output: Option<PathBuf>) -> Result<()> {
    let now = Utc::now();
    let document = prefs.export(now).await?;
    let path = output.unwrap_or_else(|| PathBuf::from(export_file_name(now)));

    std::fs::write(&path, document.to_json_pretty()?)
        .with_context(|| format!("Cannot write {}", path.display()))?;

    println!(
        "{} ({} offers, {} categories) -> {}",
        "✓ Hidden offers and categories exported successfully".green(),
        document.hidden_offers.len(),
        document.hidden_categories.len(),
        path.display()
    );
    Ok(())
}

async fn cmd_import(prefs: &Preferences, file: &Path) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Cannot read {}", file.display()))?;

    match prefs.import_json(&text).await {
        Ok(summary) => {
            println!("{}", format!("✓ {}", summary.message()).green());
            if summary.offers_added > 0 || summary.categories_added > 0 {
                println!(
                    "  {} new offers, {} new categories",
                    summary.offers_added.to_string().green(),
                    summary.categories_added.to_string().green()
                );
            }
            Ok(())
        }
        Err(e) => {
            tracing::error!("Import error: {}", e);
            Err(anyhow::anyhow!("Failed to import: Invalid file format"))
        }
    }
}

//! Modmarket cart CLI - drive the cart engine against a live marketplace API.
//!
//! # Usage
//!
//! ```bash
//! # Show badge, floating button and drawer
//! mm-cart show
//!
//! # Add or remove a mod
//! mm-cart add 42
//! mm-cart remove 42
//!
//! # Empty the cart
//! mm-cart clear
//!
//! # Interactive session that re-renders every surface after each command
//! mm-cart shell --shortcut "Ctrl+K"
//! ```
//!
//! # Environment Variables
//!
//! - `MODMARKET_API_URL` - Marketplace API base URL (required)
//! - `MODMARKET_USER_ID` / `MODMARKET_SESSION_TOKEN` - Signed-in identity
//! - `SENTRY_DSN` - Sentry error reporting (optional)
//! - `RUST_LOG` - Log filter (default `modmarket_cart=info,modmarket_cli=info`)

#![cfg_attr(not(test), forbid(unsafe_code))]
#![allow(clippy::print_stdout)]

use clap::{Parser, Subcommand};
use modmarket_cart::CartConfig;
use modmarket_core::ModId;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "mm-cart")]
#[command(author, version, about = "Mod marketplace cart")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and show the cart
    Show,
    /// Add a mod to the cart
    Add {
        /// Catalog ID of the mod
        mod_id: ModId,
    },
    /// Remove a mod from the cart
    Remove {
        /// Catalog ID of the mod
        mod_id: ModId,
    },
    /// Remove every mod from the cart
    Clear,
    /// Start an interactive cart session
    Shell {
        /// Key chord that toggles the drawer
        #[arg(long, default_value = "Ctrl+K")]
        shortcut: String,
    },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &CartConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    Some(guard)
}

/// Warnings and errors become Sentry events; info and debug become breadcrumbs.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        tracing::Level::TRACE => sentry_tracing::EventFilter::Ignore,
    }
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "modmarket_cart=info,modmarket_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match CartConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_tracing();
            tracing::error!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    let _sentry_guard = init_sentry(&config);
    init_tracing();

    let result: Result<(), commands::CommandError> = run(cli, config).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: CartConfig) -> Result<(), commands::CommandError> {
    let engine = modmarket_cart::CartEngine::from_config(&config)?;

    match cli.command {
        Commands::Show => commands::cart::show(&engine).await?,
        Commands::Add { mod_id } => commands::cart::add(&engine, mod_id).await?,
        Commands::Remove { mod_id } => commands::cart::remove(&engine, mod_id).await?,
        Commands::Clear => commands::cart::clear(&engine).await?,
        Commands::Shell { shortcut } => commands::shell::run(engine, &shortcut).await?,
    }
    Ok(())
}

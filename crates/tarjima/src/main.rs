// SPDX-FileCopyrightText: 2026 Tarjima Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tarjima - multi-tenant Telegram bot core for translation companies.
//!
//! This is the binary entry point: the `serve` launcher for bot runtimes
//! and the `webhooks` admin surface.

mod serve;
mod webhooks;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Tarjima - multi-tenant Telegram bot core.
#[derive(Parser, Debug)]
#[command(name = "tarjima", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start bot runtimes for active tenants.
    Serve(ServeArgs),
    /// Manage platform webhooks for tenants.
    Webhooks(WebhookArgs),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Run only this tenant's bot.
    #[arg(long)]
    pub tenant: Option<i64>,

    /// List tenants and their bot configuration, then exit.
    #[arg(long)]
    pub list: bool,

    /// Restart on source changes (development mode).
    #[arg(long)]
    pub auto_reload: bool,

    /// Internal: suppress the reload wrapper inside spawned children.
    #[arg(long, hide = true)]
    pub no_reload: bool,
}

#[derive(Args, Debug)]
pub struct WebhookArgs {
    /// What to do.
    #[arg(long, value_enum, default_value_t = WebhookAction::List)]
    pub action: WebhookAction,

    /// Tenant id for single-tenant actions.
    #[arg(long)]
    pub tenant: Option<i64>,

    /// Public base URL, e.g. https://yourdomain.com
    #[arg(long)]
    pub base_url: Option<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookAction {
    /// List tenants and their bot configuration.
    List,
    /// Register the webhook for one tenant.
    Register,
    /// Register webhooks for every active tenant.
    RegisterAll,
    /// Show webhook diagnostics for one tenant.
    Info,
}

/// Initializes the tracing subscriber with the configured log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("tarjima={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load and validate configuration at startup.
    let config = match tarjima_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            tarjima_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.agent.log_level);

    let result = match cli.command {
        Some(Commands::Serve(args)) => serve::run_serve(config, args).await,
        Some(Commands::Webhooks(args)) => webhooks::run_webhooks(config, args).await,
        None => {
            println!("tarjima: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

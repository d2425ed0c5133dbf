use clap::Parser;
use scheduler_core::repository::PgStore;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod config;

use cli::{Cli, Commands, OwnerSubcommand};
use config::WorkerConfig;

#[tokio::main]
async fn main() {
    init_tracing();

    // Parse args first: --help/--version must work without a database to
    // talk to, and clap exits the process internally for those.
    let cli = Cli::parse();

    let config = match WorkerConfig::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "failed to load worker configuration");
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run => commands::run::run(config).await,
        Commands::Owner(owner_command) => run_owner_command(config, owner_command.command).await,
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "command failed");
        std::process::exit(1);
    }
}

async fn run_owner_command(config: WorkerConfig, command: OwnerSubcommand) -> anyhow::Result<()> {
    let pool = scheduler_core::db::establish_connection(&config.database_url).await?;
    let time_of_day = config.engine.delivery_time()?;
    let store = PgStore::new(pool, time_of_day);

    match command {
        OwnerSubcommand::Add(add) => commands::owner::add(&store, add).await,
        OwnerSubcommand::List => commands::owner::list(&store).await,
        OwnerSubcommand::Update(update) => commands::owner::update(&store, update).await,
        OwnerSubcommand::Delete(delete) => commands::owner::delete(&store, delete).await,
    }
}

/// Structured JSON logging (§10.3): this is a long-running service with no
/// interactive user, so there's no colorized terminal output to print, only
/// aggregated log lines an operator (or log pipeline) reads.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,scheduler_core=debug,scheduler_worker=debug")),
        )
        .json()
        .init();
}

//! Command-line surface of the worker binary. `run` starts the long-running
//! service (recovery sweep, ticker, executor pool); the `owner` subcommands
//! are an administrative seeding/inspection surface for local operation and
//! integration tests — not the HTTP CRUD surface named out of scope in §1.

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about = "Birthday event scheduler worker", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the recovery sweep, then the periodic scheduler tick loop and
    /// executor workers until interrupted.
    Run,
    /// Administer owner fixtures (seeding/inspection only; the real CRUD
    /// surface lives outside this core).
    Owner(OwnerCommand),
}

#[derive(Parser, Debug)]
pub struct OwnerCommand {
    #[command(subcommand)]
    pub command: OwnerSubcommand,
}

#[derive(Subcommand, Debug)]
pub enum OwnerSubcommand {
    /// Create an owner and materialize its first BIRTHDAY event.
    Add(AddOwnerCommand),
    /// List all owners.
    List,
    /// Update an owner's fields; birthday/timezone changes atomically
    /// reschedule any PENDING event.
    Update(UpdateOwnerCommand),
    /// Delete an owner and cascade-delete its events.
    Delete(DeleteOwnerCommand),
}

#[derive(Parser, Debug)]
pub struct AddOwnerCommand {
    #[arg(long)]
    pub first_name: String,
    #[arg(long)]
    pub last_name: String,
    /// Date of birth, YYYY-MM-DD.
    #[arg(long)]
    pub dob: String,
    /// IANA timezone name; defaults to the host's detected zone.
    #[arg(long)]
    pub timezone: Option<String>,
    #[arg(long)]
    pub webhook_url: String,
}

#[derive(Parser, Debug)]
pub struct UpdateOwnerCommand {
    pub id: String,
    #[arg(long)]
    pub first_name: Option<String>,
    #[arg(long)]
    pub last_name: Option<String>,
    #[arg(long)]
    pub dob: Option<String>,
    #[arg(long)]
    pub timezone: Option<String>,
    #[arg(long)]
    pub webhook_url: Option<String>,
}

#[derive(Parser, Debug)]
pub struct DeleteOwnerCommand {
    pub id: String,
}

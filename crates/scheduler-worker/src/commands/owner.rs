//! Owner administration commands (§6): a thin seeding/inspection surface
//! over `OwnerRepository`, not a replacement for an HTTP CRUD surface.

use crate::cli::{AddOwnerCommand, DeleteOwnerCommand, UpdateOwnerCommand};
use crate::config::detect_system_timezone;
use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use scheduler_core::models::{NewOwnerData, UpdateOwnerData};
use scheduler_core::repository::OwnerRepository;
use uuid::Uuid;

pub async fn add(repo: &impl OwnerRepository, command: AddOwnerCommand) -> Result<()> {
    let date_of_birth = NaiveDate::parse_from_str(&command.dob, "%Y-%m-%d")
        .with_context(|| format!("'{}' is not a YYYY-MM-DD date", command.dob))?;
    let timezone = command.timezone.unwrap_or_else(detect_system_timezone);

    let (owner, event) = repo
        .create_owner(
            NewOwnerData {
                first_name: command.first_name,
                last_name: command.last_name,
                date_of_birth,
                timezone,
                webhook_url: command.webhook_url,
            },
            Utc::now(),
        )
        .await?;

    println!(
        "created owner {} ({} {}); first BIRTHDAY event {} targets {}",
        owner.id, owner.first_name, owner.last_name, event.id, event.target_timestamp_utc
    );
    Ok(())
}

pub async fn list(repo: &impl OwnerRepository) -> Result<()> {
    let owners = repo.find_owners().await?;
    if owners.is_empty() {
        println!("no owners");
        return Ok(());
    }
    for owner in owners {
        println!(
            "{}\t{} {}\tdob={}\ttz={}\twebhook={}",
            owner.id, owner.first_name, owner.last_name, owner.date_of_birth, owner.timezone, owner.webhook_url
        );
    }
    Ok(())
}

pub async fn update(repo: &impl OwnerRepository, command: UpdateOwnerCommand) -> Result<()> {
    let id: Uuid = command.id.parse().context("owner id must be a UUID")?;
    let new_birthday = command
        .dob
        .as_deref()
        .map(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d"))
        .transpose()
        .context("--dob must be YYYY-MM-DD")?;

    let owner = repo
        .update_owner(
            id,
            UpdateOwnerData {
                first_name: command.first_name,
                last_name: command.last_name,
                new_birthday,
                new_timezone: command.timezone,
                webhook_url: command.webhook_url,
            },
            Utc::now(),
        )
        .await?;

    println!("updated owner {} ({} {})", owner.id, owner.first_name, owner.last_name);
    Ok(())
}

pub async fn delete(repo: &impl OwnerRepository, command: DeleteOwnerCommand) -> Result<()> {
    let id: Uuid = command.id.parse().context("owner id must be a UUID")?;
    repo.delete_owner(id).await?;
    println!("deleted owner {id} and its events");
    Ok(())
}

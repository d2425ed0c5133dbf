//! # Birthday Scheduler Core
//!
//! Durable, exactly-once materialization and delivery of timezone-aware
//! birthday events: owners carry a date of birth and an IANA timezone, the
//! Materializer computes the next occurrence at 09:00 local time, and the
//! Scheduler/Executor pair claim and deliver each event's webhook exactly
//! once, surviving crashes, concurrent workers, DST transitions, and
//! mid-flight owner edits.
//!
//! ## Core Modules
//!
//! - [`db`]: Connection pool and migration management
//! - [`models`]: Core data structures (`Event`, `Owner`, work-queue descriptors)
//! - [`time_service`]: Pure timezone/DST/leap-day occurrence math
//! - [`materializer`]: Pure computation of the next `Event` row for an owner
//! - [`repository`]: Durable storage — `EventStore` and `OwnerRepository`, backed by Postgres
//! - [`queue`]: The Work Queue abstraction and its in-process implementation
//! - [`scheduler`]: The periodic claim-and-dispatch driver, recovery sweep, and watchdog
//! - [`executor`]: Webhook delivery, retry/backoff, and finalization
//! - [`clock`]: Time injection so no core code reads the wall clock directly
//! - [`config`]: The engine's tunable settings
//! - [`error`]: The crate's error taxonomy
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use scheduler_core::{
//!     clock::SystemClock, config::EngineConfig, db, queue::InProcessQueue,
//!     repository::PgStore, scheduler::Scheduler,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pool = db::establish_connection("postgres://localhost/birthdays").await?;
//!     let config = EngineConfig::default();
//!     let store = Arc::new(PgStore::new(pool, config.delivery_time()?));
//!     let clock = Arc::new(SystemClock);
//!     let queue = Arc::new(InProcessQueue::new(chrono::Duration::seconds(30), 3, clock.clone()));
//!     let scheduler = Scheduler::new(store, queue, clock, EngineConfig::default());
//!
//!     scheduler.recover().await?;
//!     scheduler.tick().await?;
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod executor;
pub mod materializer;
pub mod models;
pub mod queue;
pub mod repository;
pub mod scheduler;
pub mod time_service;

use crate::error::CoreError;
use sqlx::postgres::{PgPool, PgPoolOptions};

// Re-export the pool type so callers don't need a direct sqlx dependency.
pub use sqlx::PgPool as DbPool;

/// Establishes a connection pool to Postgres and runs pending migrations.
///
/// There is no database file to create up front; the engine itself (not
/// this function) owns the row-level locking `claimReadyEvents` needs.
pub async fn establish_connection(database_url: &str) -> Result<PgPool, CoreError> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Database error")]
    Database(#[from] sqlx::Error),

    #[error("Migration error")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("IO error")]
    Io(#[from] std::io::Error),

    #[error("Event not found: {0}")]
    NotFound(String),

    #[error("Owner not found: {0}")]
    OwnerNotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Illegal status transition: {from} -> {to}")]
    IllegalTransition { from: String, to: String },

    #[error("Optimistic lock conflict on event {0}: stored version does not match")]
    OptimisticLockConflict(String),

    #[error("Duplicate idempotency key: {0}")]
    DuplicateKey(String),

    #[error("Work queue publish failed: {0}")]
    QueuePublishFailure(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("An unknown error has occurred.")]
    Unknown,
}

impl CoreError {
    /// Whether a caller should retry the operation that produced this error
    /// on its own schedule (the next tick, the next redrive) rather than
    /// treat it as a terminal failure. Webhook delivery has its own
    /// first-class outcome type (`DeliveryOutcome`) and isn't represented
    /// here.
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::QueuePublishFailure(_) | CoreError::Database(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_publish_failure_and_database_errors_are_transient() {
        assert!(CoreError::QueuePublishFailure("full".to_string()).is_transient());
        assert!(CoreError::Unknown.is_transient() == false);
    }
}

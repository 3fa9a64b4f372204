//! Error types for the store library.

use thiserror::Error;

/// Main error type for catalog, migration, and store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Entity does not exist, or exists but belongs to another user.
    /// The two cases are deliberately indistinguishable.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A uniqueness rule rejected the write.
    #[error("already exists: {detail}")]
    AlreadyExists { detail: String },

    /// A plan limit or spend cap rejected the operation.
    #[error("quota exceeded for {resource} (limit {limit})")]
    QuotaExceeded { resource: &'static str, limit: i64 },

    /// Invalid input or an unsatisfiable schema declaration.
    #[error("validation error: {0}")]
    Validation(String),

    /// Concurrent modification lost after bounded retries.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The per-request deadline expired before the operation finished.
    #[error("operation timed out: {operation}")]
    Timeout { operation: &'static str },

    /// A migration step failed; the database is at the last good revision.
    #[error("migration failed at revision {revision}: {message}")]
    MigrationFailed { revision: String, message: String },

    /// Configuration error (invalid YAML, missing fields, bad key material).
    #[error("configuration error: {0}")]
    Config(String),

    /// Unexpected failure. Details are logged server-side under the
    /// correlation id; the message carries no internals.
    #[error("internal error (correlation id {correlation_id})")]
    Internal {
        correlation_id: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// IO error (config file access).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML deserialization error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    /// Create a NotFound error.
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(detail: impl Into<String>) -> Self {
        StoreError::AlreadyExists {
            detail: detail.into(),
        }
    }

    /// Create a Validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        StoreError::Validation(message.into())
    }

    /// Create a MigrationFailed error.
    pub fn migration(revision: impl Into<String>, message: impl Into<String>) -> Self {
        StoreError::MigrationFailed {
            revision: revision.into(),
            message: message.into(),
        }
    }

    /// Wrap an unexpected error, minting a correlation id and logging the
    /// full detail server-side. Display output carries only the id.
    pub fn internal(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        let correlation_id = uuid::Uuid::new_v4().to_string();
        tracing::error!(
            correlation_id = %correlation_id,
            error = %source,
            "internal error"
        );
        StoreError::Internal {
            correlation_id,
            source: Box::new(source),
        }
    }

    /// Stable machine-readable code for API surfaces and logs.
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::NotFound { .. } => "not_found",
            StoreError::AlreadyExists { .. } => "already_exists",
            StoreError::QuotaExceeded { .. } => "quota_exceeded",
            StoreError::Validation(_) => "validation_error",
            StoreError::Conflict(_) => "conflict",
            StoreError::Timeout { .. } => "timeout",
            StoreError::MigrationFailed { .. } => "migration_failed",
            StoreError::Config(_) => "config_error",
            StoreError::Internal { .. } => "internal",
            StoreError::Io(_) => "io_error",
            StoreError::Yaml(_) | StoreError::Json(_) => "serialization_error",
        }
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> i32 {
        match self {
            StoreError::Config(_) | StoreError::Validation(_) => 2,
            StoreError::MigrationFailed { .. } => 3,
            StoreError::NotFound { .. } => 4,
            _ => 1,
        }
    }

    /// Format error with full details including error chain.
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            let code = db.code().map(|c| c.to_string()).unwrap_or_default();
            let message = db.message().to_string();

            // Serialization failures and lock contention retry as Conflict.
            // 40001/40P01: server-side serialization failure / deadlock.
            // 5/6 (and extended forms): embedded busy / locked.
            if code == "40001"
                || code == "40P01"
                || code == "5"
                || code == "6"
                || code == "517"
                || code == "262"
                || message.contains("database is locked")
            {
                return StoreError::Conflict(message);
            }

            // Unique violations. 23505: server; 1555/2067: embedded
            // primary-key and unique-index constraint codes.
            if code == "23505"
                || code == "1555"
                || code == "2067"
                || message.contains("UNIQUE constraint failed")
            {
                return StoreError::already_exists(message);
            }
        }
        StoreError::internal(err)
    }
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(StoreError::not_found("project", "p1").code(), "not_found");
        assert_eq!(
            StoreError::QuotaExceeded {
                resource: "spend_cap",
                limit: 10000
            }
            .code(),
            "quota_exceeded"
        );
        assert_eq!(StoreError::validation("bad").code(), "validation_error");
        assert_eq!(
            StoreError::migration("0001", "boom").code(),
            "migration_failed"
        );
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(StoreError::Config("x".into()).exit_code(), 2);
        assert_eq!(StoreError::migration("r", "m").exit_code(), 3);
        assert_eq!(StoreError::Conflict("c".into()).exit_code(), 1);
    }

    #[test]
    fn test_internal_hides_detail() {
        let err = StoreError::internal(std::io::Error::new(
            std::io::ErrorKind::Other,
            "secret detail",
        ));
        let shown = err.to_string();
        assert!(shown.contains("correlation id"));
        assert!(!shown.contains("secret detail"));
        // format_detailed keeps the chain for server-side logs
        assert!(err.format_detailed().contains("secret detail"));
    }

    #[test]
    fn test_not_found_message() {
        let err = StoreError::not_found("agent", "a-123");
        assert_eq!(err.to_string(), "agent not found: a-123");
    }
}

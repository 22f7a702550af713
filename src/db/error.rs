use std::path::PathBuf;

/// Errors from the local store. All of them are fatal to the operation that
/// hit them.
#[derive(Debug)]
pub enum StoreError {
    /// SQLite error.
    Sqlite(sqlx::Error),
    /// Schema migration failed.
    Migrate(sqlx::migrate::MigrateError),
    /// Could not prepare the database directory.
    Io(PathBuf, std::io::Error),
    /// A memo record could not be encoded or decoded.
    Corrupt { id: i64, source: serde_json::Error },
    /// A general store value could not be encoded or decoded.
    Serialization(String, serde_json::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Sqlite(e) => write!(f, "SQLite error: {}", e),
            StoreError::Migrate(e) => write!(f, "Migration error: {}", e),
            StoreError::Io(path, e) => write!(f, "I/O error for {}: {}", path.display(), e),
            StoreError::Corrupt { id, source } => {
                write!(f, "Corrupt memo record {}: {}", id, source)
            }
            StoreError::Serialization(key, e) => {
                write!(f, "Invalid stored value for {}: {}", key, e)
            }
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Sqlite(e) => Some(e),
            StoreError::Migrate(e) => Some(e),
            StoreError::Io(_, e) => Some(e),
            StoreError::Corrupt { source, .. } => Some(source),
            StoreError::Serialization(_, e) => Some(e),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Sqlite(e)
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(e: sqlx::migrate::MigrateError) -> Self {
        StoreError::Migrate(e)
    }
}

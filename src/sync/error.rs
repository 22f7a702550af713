use crate::db::StoreError;

/// Errors that can occur while talking to the memo server.
///
/// A memo that is missing on the server is not an error: the reply simply
/// carries no memo.
#[derive(Debug)]
pub enum SyncError {
    /// Sync is not configured
    NotConfigured,
    /// Request could not be sent or the connection failed
    Http(String),
    /// Server answered with something other than 200
    Status { status: u16, context: String },
    /// Reply body was not the expected JSON
    Decode(String),
    /// Local store failed while applying a reply
    Store(StoreError),
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncError::NotConfigured => write!(
                f,
                "Sync not configured. Add server_url and api_key to config."
            ),
            SyncError::Http(e) => write!(f, "Connection error: {}", e),
            SyncError::Status { status, context } => {
                write!(f, "Failed to {}, server status {}", context, status)
            }
            SyncError::Decode(e) => write!(f, "Invalid server reply: {}", e),
            SyncError::Store(e) => write!(f, "Storage error: {}", e),
        }
    }
}

impl std::error::Error for SyncError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SyncError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for SyncError {
    fn from(e: StoreError) -> Self {
        SyncError::Store(e)
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            SyncError::Decode(e.to_string())
        } else {
            SyncError::Http(e.to_string())
        }
    }
}

use async_trait::async_trait;

use super::SyncError;
use crate::models::{Memo, ServerMemoReply};

/// The remote authority as seen by the sync engine.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Current server copy of `id`. A reply without a memo means the server
    /// does not have it.
    async fn fetch_memo(&self, id: i64) -> Result<ServerMemoReply, SyncError>;

    /// Saves `memo` and returns what the server stored. Negative ids ask the
    /// server to assign a new one.
    async fn push_memo(&self, memo: &Memo) -> Result<ServerMemoReply, SyncError>;
}

use serde::{Deserialize, Serialize};

use super::Memo;

/// The unit of local persistence: the latest locally known memo paired with
/// the latest memo confirmed by the server.
///
/// `server` is absent for memos that never made a round trip. `id` always
/// equals `local.id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DualSnapshot {
    pub id: i64,
    pub local: Memo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<Memo>,
}

impl DualSnapshot {
    /// A record with no server half.
    pub fn local_only(local: Memo) -> Self {
        Self {
            id: local.id,
            local,
            server: None,
        }
    }

    /// A record where both halves are the memo the server just confirmed.
    pub fn confirmed(memo: Memo) -> Self {
        Self {
            id: memo.id,
            local: memo.clone(),
            server: Some(memo),
        }
    }

    /// Replaces the local half, keeping the server half of `previous` for
    /// memos the server knows about.
    pub fn with_local(local: Memo, previous: &DualSnapshot) -> Self {
        let server = if local.is_new() {
            None
        } else {
            previous.server.clone()
        };
        Self {
            id: local.id,
            local,
            server,
        }
    }

    /// True if the local half still has to be pushed to the server.
    pub fn is_dirty(&self) -> bool {
        match &self.server {
            None => true,
            Some(server) => self.local.timestamp.unwrap_or(0) > server.timestamp.unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTime {
    pub id: i64,
    pub last_access: i64,
}

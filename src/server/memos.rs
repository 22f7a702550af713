use std::collections::BTreeMap;

use crate::models::{IdName, ServerMemo};

/// In-memory memo table of the reference server.
#[derive(Debug, Default)]
pub struct MemoTable {
    memos: BTreeMap<i64, ServerMemo>,
    last_id: i64,
}

impl MemoTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: i64) -> Option<ServerMemo> {
        self.memos.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.memos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memos.is_empty()
    }

    /// Creates (`memo_id` absent) or updates a memo.
    ///
    /// Empty text deletes the memo. `Ok(None)` comes back whenever no memo
    /// survives the save, including updates of unknown ids. Only the owner
    /// may update or delete a memo.
    pub fn save(
        &mut self,
        memo_id: Option<i64>,
        group: Option<IdName>,
        text: &str,
        user: &IdName,
        now: i64,
    ) -> Result<Option<ServerMemo>, NotOwner> {
        let (title, memotext) = split_title(text);

        let Some(id) = memo_id else {
            if text.is_empty() {
                return Ok(None);
            }
            self.last_id += 1;
            let memo = ServerMemo {
                id: self.last_id,
                memogroup: group,
                user: user.clone(),
                title: Some(title.to_string()),
                memotext: Some(memotext.to_string()),
                savetime: Some(now),
            };
            tracing::info!(id = memo.id, user = %user.name, "created memo");
            self.memos.insert(memo.id, memo.clone());
            return Ok(Some(memo));
        };

        let Some(memo) = self.memos.get_mut(&id) else {
            return Ok(None);
        };
        if memo.user.id != user.id {
            tracing::warn!(id, user = %user.name, owner = %memo.user.name, "refusing save by non-owner");
            return Err(NotOwner {
                id,
                owner: memo.user.clone(),
            });
        }

        if text.is_empty() {
            self.memos.remove(&id);
            tracing::info!(id, "deleted memo");
            return Ok(None);
        }

        memo.memogroup = group;
        memo.title = Some(title.to_string());
        memo.memotext = Some(memotext.to_string());
        // Two saves in the same millisecond must still be told apart.
        memo.savetime = Some(now.max(memo.savetime.unwrap_or(0) + 1));
        tracing::info!(id, "updated memo");
        Ok(Some(memo.clone()))
    }
}

/// A save of a memo that belongs to someone else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotOwner {
    pub id: i64,
    pub owner: IdName,
}

impl std::fmt::Display for NotOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "memo {} belongs to {}", self.id, self.owner.name)
    }
}

impl std::error::Error for NotOwner {}

/// First line including its line break, and the remainder.
fn split_title(text: &str) -> (&str, &str) {
    match text.find('\n') {
        Some(end) => text.split_at(end + 1),
        None => (text, ""),
    }
}

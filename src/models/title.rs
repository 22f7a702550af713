use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{extract_title, AccessTime, DualSnapshot};

/// One line of a memo listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoTitle {
    pub id: i64,
    pub title: String,
    pub group_id: Option<i64>,
    pub owner_id: Option<i64>,
    pub last_access: i64,
    pub readonly: bool,
}

impl MemoTitle {
    pub fn from_snapshot(record: &DualSnapshot) -> Self {
        let local = &record.local;
        Self {
            id: record.id,
            title: extract_title(local).to_string(),
            group_id: local.group.as_ref().map(|g| g.id),
            owner_id: local.owner.as_ref().map(|o| o.id),
            last_access: 0,
            readonly: local.readonly,
        }
    }
}

/// Cleans up titles and puts the most recently accessed memos first.
///
/// Memos without an access record fall back to their id, which for new
/// memos is the negated creation time.
pub fn make_title_list(titles: Vec<MemoTitle>, access_times: &[AccessTime]) -> Vec<MemoTitle> {
    let last_access: HashMap<i64, i64> = access_times
        .iter()
        .map(|a| (a.id, a.last_access))
        .collect();

    let mut titles: Vec<MemoTitle> = titles
        .into_iter()
        .map(|mut memo| {
            memo.title = strip_header(&memo.title.replace('\r', "")).to_string();
            memo.last_access = last_access.get(&memo.id).copied().unwrap_or(memo.id);
            memo
        })
        .collect();

    titles.sort_by(|a, b| b.last_access.cmp(&a.last_access));
    titles
}

/// Strips a leading markdown header marker (`#`, `##`, ... followed by whitespace).
fn strip_header(title: &str) -> &str {
    let rest = title.trim_start_matches('#');
    if rest.len() == title.len() {
        return title;
    }
    let trimmed = rest.trim_start();
    if trimmed.len() == rest.len() {
        title
    } else {
        trimmed
    }
}

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// A named reference used for memo groups and users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdName {
    pub id: i64,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
}

impl IdName {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// A point-in-time snapshot of a memo.
///
/// Negative ids belong to memos created locally that the server has not
/// assigned an id to yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memo {
    pub id: i64,
    pub text: String,
    #[serde(rename = "memogroup", default, skip_serializing_if = "Option::is_none")]
    pub group: Option<IdName>,
    #[serde(rename = "user", default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<IdName>,
    /// Milliseconds since the epoch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub readonly: bool,
}

impl Memo {
    pub fn new(id: i64, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            group: None,
            owner: None,
            timestamp: None,
            readonly: false,
        }
    }

    /// Id for a memo created at `now_ms`, always negative.
    pub fn new_local_id(now_ms: i64) -> i64 {
        -now_ms.max(1)
    }

    pub fn with_group(mut self, group: IdName) -> Self {
        self.group = Some(group);
        self
    }

    pub fn with_owner(mut self, owner: IdName) -> Self {
        self.owner = Some(owner);
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn is_new(&self) -> bool {
        self.id < 0
    }

    /// Value equality over text, id and group id; every other field is ignored.
    pub fn content_eq(&self, other: &Memo) -> bool {
        if self.text != other.text || self.id != other.id {
            return false;
        }
        match (&self.group, &other.group) {
            (None, None) => true,
            (Some(a), Some(b)) => a.id == b.id,
            _ => false,
        }
    }
}

/// First line of the memo text.
pub fn extract_title(memo: &Memo) -> &str {
    if memo.text.is_empty() {
        return "No title found";
    }
    memo.text.split(['\n', '\r']).next().unwrap_or_default()
}

/// Flips the `nth` markdown checkbox (`- [ ]` / `- [x]`) in `text`.
pub fn toggle_checkbox(text: &str, nth: usize) -> Option<String> {
    let (start, checked) = text
        .match_indices("- [")
        .filter_map(|(i, _)| match text.get(i + 3..i + 5) {
            Some("x]") => Some((i, true)),
            Some(" ]") => Some((i, false)),
            _ => None,
        })
        .nth(nth)?;

    let mut out = String::with_capacity(text.len());
    out.push_str(&text[..start]);
    out.push_str(if checked { "- [ ]" } else { "- [x]" });
    out.push_str(&text[start + 5..]);
    Some(out)
}

impl fmt::Display for Memo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "「memo {}: {}」", self.id, extract_title(self))
    }
}
